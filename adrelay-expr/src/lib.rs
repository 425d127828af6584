pub mod error;
pub mod eval;
pub mod macros;
pub mod template;
pub mod value;

pub use error::ExprError;
pub use eval::eval_expr;
pub use macros::{apply_macros, build_macro_map, clean_event_name};
pub use template::{eval_body_template, render_template};
pub use value::Value;
