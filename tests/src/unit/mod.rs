mod config_tests;
mod session_tests;
