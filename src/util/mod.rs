pub mod strings;

pub use strings::{RandStringGenerator, StringGenerator};
