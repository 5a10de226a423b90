mod session_tests;
mod support;
