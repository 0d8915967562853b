use crate::language::parser;
use crate::language::resolve::{Env, GlobalFlags};
use crate::language::syntax::Term;
use crate::runtime;
use crate::runtime::reduce::Mode;
use crate::runtime::store::Store;

// A store, an environment, and the settings they were opened with; the
// REPL keeps one of these alive across lines.
pub struct Session {
  pub store: Store,
  pub env: Env,
  pub mode: Mode,
  pub trace: bool,
}

impl Session {
  pub fn new(size: usize, mode: Mode, trace: bool) -> Self {
    Session { store: Store::new(size), env: Env::new(), mode, trace }
  }

  // Loads `Name = term` definitions, in order. Returns how many.
  pub fn load(&mut self, code: &str) -> Result<usize, String> {
    let defs = parser::read_defs(code)?;
    let count = defs.len();
    for (name, term) in &defs {
      self.env.define(&mut self.store, name, term, GlobalFlags::transparent())?;
    }
    Ok(count)
  }

  pub fn define(&mut self, name: &str, src: &str) -> Result<(), String> {
    let term = parser::read_term(src)?;
    self.env.define(&mut self.store, name, &term, GlobalFlags::transparent())?;
    Ok(())
  }

  // Evaluates an expression to a term: parse, resolve, flatten, reduce,
  // read back. Returns the term, rule firings, and elapsed milliseconds.
  pub fn eval_term(&mut self, src: &str) -> Result<(Term, u64, u64), String> {
    let term = parser::read_term(src)?;
    let code = self.env.resolve(&term)?;
    let head = runtime::flatten(&mut self.store, &self.env, &code);

    let init = instant::Instant::now();
    let steps = runtime::reduce(&mut self.store, head, self.mode, self.trace, 0);
    let time = init.elapsed().as_millis() as u64;

    let out = runtime::unflatten(&self.store, &self.env, head);
    self.store.free_graph(head);
    Ok((out, steps, time))
  }

  pub fn eval(&mut self, src: &str) -> Result<(String, u64, u64), String> {
    let (term, steps, time) = self.eval_term(src)?;
    Ok((format!("{}", term), steps, time))
  }
}

// Evaluates one expression against a definitions file.
pub fn eval(
  defs: &str,
  expr: &str,
  size: usize,
  mode: Mode,
  trace: bool,
) -> Result<(String, u64, u64), String> {
  let mut session = Session::new(size, mode, trace);
  session.load(defs)?;
  session.eval(expr)
}
