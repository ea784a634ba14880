pub mod packer;

pub use packer::{BundleFailure, BundleFormat, BundleItem, BundleOperation, BundleReport, Bundler};
