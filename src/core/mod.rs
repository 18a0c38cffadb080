pub mod config;
pub mod download;
pub mod extract;
pub mod installer;
pub mod progress;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
