pub mod api;
pub mod language;
pub mod runtime;

pub use language::parser::{read_defs, read_term};
pub use language::resolve::{Env, GlobalFlags};
pub use language::syntax::{as_numeral, Oper, Term};
pub use runtime::reduce::Mode;
pub use runtime::store::Store;
