//! Cheaply cloneable, immutable strings used for models, header values and error types.

pub use arcstr::{format, literal};

pub type Strng = arcstr::ArcStr;

pub fn new<A: AsRef<str>>(s: A) -> Strng {
	Strng::from(s.as_ref())
}
