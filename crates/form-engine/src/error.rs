use thiserror::Error;

use crate::expr::ExprError;
use crate::path::FieldPath;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("please supply a model to bind the form to")]
    MissingModel,
    #[error("`{property}` expression of field `{path}` failed: {source}")]
    Expression {
        path: FieldPath,
        property: &'static str,
        source: ExprError,
    },
    #[error("form did not settle after {passes} digest passes")]
    Unstable { passes: usize },
    #[error("no field at `{0}`")]
    UnknownField(FieldPath),
    #[error("model at `{0}` is not an object")]
    ModelNotObject(FieldPath),
    #[error("failed to render the template of field `{path}`: {source}")]
    Template {
        path: FieldPath,
        source: handlebars::RenderError,
    },
}
