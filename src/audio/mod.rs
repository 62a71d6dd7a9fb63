pub mod decoder;
pub mod encoder;
pub mod filter;
pub mod resample;
pub mod source;

pub use filter::{IirFilter, SampleFilter};
pub use source::{AnySource, FileSource, MemorySource, PcmSource};
