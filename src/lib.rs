pub mod builder;
pub mod catalog;
pub mod error;
pub mod report;
pub mod runtime;
pub mod toolchain;
pub mod version;
