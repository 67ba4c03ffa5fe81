pub mod field;
pub mod form;

pub use field::{DynamicProperty, Field};
pub use form::{FieldSet, Form};
