//! Cross-module tests for threadline-core.

#[cfg(test)]
mod unit;
