pub mod services;
mod sniff;

pub use sniff::ImageKind;
