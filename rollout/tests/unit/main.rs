//! Integration tests, run against local directories standing in for servers


mod test_fleet;
mod test_migrate;
mod test_release;
mod test_script;
