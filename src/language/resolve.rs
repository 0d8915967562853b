// Name resolution
// ---------------
//
// Turns surface terms into the engine's positional representation: a
// scope stack of binder groups gives every variable an (up, across) pair,
// and every remaining name must be a registered global. The engine never
// sees a name again after this point.
//
// The environment owns one value graph per transparent global, flattened
// and pre-reduced at definition time into the shared store; references to
// it are intentionally shared (counted, never back-referenced). Opaque
// globals stay index-only forever; literal globals inline.

use crate::language::syntax::Term;
use crate::runtime::flatten::{flatten, Code, GlobalRef, Globals};
use crate::runtime::reduce::{reduce, Mode};
use crate::runtime::store::{Ix, Literal, Store, NIL};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug)]
pub struct GlobalFlags {
  // Never expanded; applications of it are inert.
  pub opaque: bool,
  // The definition is a literal and is inlined at flatten time.
  pub literal: bool,
  // Pre-reduce the definition graph to full normal form.
  pub deep: bool,
  // The definition graph lives at depth zero.
  pub lifted: bool,
}

impl GlobalFlags {
  pub fn transparent() -> Self {
    GlobalFlags { opaque: false, literal: false, deep: true, lifted: true }
  }

  pub fn opaque() -> Self {
    GlobalFlags { opaque: true, literal: false, deep: false, lifted: true }
  }
}

pub struct Global {
  pub name: String,
  pub flags: GlobalFlags,
  // Sentinel of the value graph (NIL for opaque and literal globals).
  head: Ix,
  // Cached entry target, valid after the definition was reduced.
  root: Ix,
  lit: Option<Literal>,
}

pub struct Env {
  globals: Vec<Global>,
  index: HashMap<String, u32>,
}

impl Env {
  pub fn new() -> Self {
    Env { globals: Vec::new(), index: HashMap::new() }
  }

  pub fn lookup(&self, name: &str) -> Option<u32> {
    self.index.get(name).copied()
  }

  pub fn name(&self, index: u32) -> &str {
    &self.globals[index as usize].name
  }

  pub fn flags(&self, index: u32) -> GlobalFlags {
    self.globals[index as usize].flags
  }

  // Sentinels of all owned value graphs; audit roots.
  pub fn roots(&self) -> Vec<Ix> {
    self.globals.iter().filter(|g| g.head != NIL).map(|g| g.head).collect()
  }

  // Registers an opaque constant: a name the engine treats as an inert
  // index.
  pub fn define_opaque(&mut self, name: &str) -> u32 {
    self.push(Global {
      name: name.to_string(),
      flags: GlobalFlags::opaque(),
      head: NIL,
      root: NIL,
      lit: None,
    })
  }

  // Defines a global from a term: resolved against the current
  // environment, flattened, and pre-reduced per its flags. A literal
  // definition under the literal flag skips the graph entirely.
  pub fn define(
    &mut self,
    store: &mut Store,
    name: &str,
    term: &Term,
    flags: GlobalFlags,
  ) -> Result<u32, String> {
    let code = self.resolve(term)?;
    if flags.literal {
      if let Code::Lit { val } = &code {
        return Ok(self.push(Global {
          name: name.to_string(),
          flags,
          head: NIL,
          root: NIL,
          lit: Some(val.clone()),
        }));
      }
      return Err(format!("definition of '{}' is flagged literal but is not one", name));
    }
    let head = flatten(store, self, &code);
    let mode = if flags.deep { Mode::Deep } else { Mode::Surface };
    reduce(store, head, mode, false, 0);
    let root = match store.node(head).slots[0].target() {
      Some(root) => root,
      None => return Err(format!("definition of '{}' reduced to nothing", name)),
    };
    Ok(self.push(Global { name: name.to_string(), flags, head, root, lit: None }))
  }

  fn push(&mut self, global: Global) -> u32 {
    let index = self.globals.len() as u32;
    // Redefinition shadows; the old graph stays alive for old referrers.
    self.index.insert(global.name.clone(), index);
    self.globals.push(global);
    index
  }

  // Resolution
  // ----------

  pub fn resolve(&self, term: &Term) -> Result<Code, String> {
    let mut scope: Vec<Vec<String>> = Vec::new();
    self.resolve_term(term, &mut scope)
  }

  fn resolve_term(&self, term: &Term, scope: &mut Vec<Vec<String>>) -> Result<Code, String> {
    match term {
      Term::Var { name } => {
        for (up, group) in scope.iter().rev().enumerate() {
          if let Some(across) = group.iter().position(|n| n == name) {
            return Ok(Code::Bound { up: up as u32, across: across as u32 });
          }
        }
        match self.lookup(name) {
          Some(index) => Ok(Code::Free { index }),
          None => Err(format!("unbound name '{}'", name)),
        }
      }
      Term::Lam { pars, body } => {
        scope.push(pars.clone());
        let body = Box::new(self.resolve_term(body, scope)?);
        scope.pop();
        Ok(Code::Lam { pars: pars.clone(), body })
      }
      Term::Fix { pars, body } => {
        if pars.is_empty() {
          return Err(String::from("fixpoint without a self name"));
        }
        scope.push(pars.clone());
        let body = Box::new(self.resolve_term(body, scope)?);
        scope.pop();
        Ok(Code::Fix { pars: pars.clone(), body })
      }
      Term::App { func, args } => {
        let func = Box::new(self.resolve_term(func, scope)?);
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
          out.push(self.resolve_term(arg, scope)?);
        }
        Ok(Code::App { func, args: out })
      }
      Term::Let { defs, body } => {
        let mut out = Vec::with_capacity(defs.len());
        for (_, def) in defs {
          out.push(self.resolve_term(def, scope)?);
        }
        scope.push(defs.iter().map(|(name, _)| name.clone()).collect());
        let body = Box::new(self.resolve_term(body, scope)?);
        scope.pop();
        Ok(Code::Let { defs: out, body })
      }
      Term::Tst { pred, then, other } => Ok(Code::Tst {
        pred: Box::new(self.resolve_term(pred, scope)?),
        then: Box::new(self.resolve_term(then, scope)?),
        other: Box::new(self.resolve_term(other, scope)?),
      }),
      Term::Cel { items } => {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
          out.push(self.resolve_term(item, scope)?);
        }
        Ok(Code::Cel { items: out })
      }
      Term::Num { numb } => Ok(Code::Lit { val: Literal::Num(*numb) }),
      Term::Str { text } => Ok(Code::Lit { val: Literal::Str(text.clone()) }),
      Term::Sym { name } => Ok(Code::Lit { val: Literal::Sym(name.clone()) }),
      Term::Opr { oper } => Ok(Code::Lit { val: Literal::Opr(*oper) }),
      Term::Pruned => Err(String::from("cannot resolve a pruned term")),
    }
  }
}

impl Default for Env {
  fn default() -> Self {
    Self::new()
  }
}

impl Globals for Env {
  fn global_value(&self, index: u32) -> GlobalRef {
    let global = &self.globals[index as usize];
    if global.flags.opaque {
      GlobalRef::Opaque
    } else if let Some(val) = &global.lit {
      GlobalRef::Literal(val.clone())
    } else {
      GlobalRef::Value(global.root)
    }
  }

  fn global_name(&self, index: u32) -> String {
    self.globals[index as usize].name.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::language::parser::read_term;

  #[test]
  fn positional_binding() {
    let env = Env::new();
    let term = read_term("[f x. (f x [y. (f y x)])]").unwrap();
    let code = env.resolve(&term).unwrap();
    let body = match code {
      Code::Lam { body, .. } => *body,
      other => panic!("resolved to {:?}", other),
    };
    match body {
      Code::App { func, args } => {
        assert!(matches!(*func, Code::Bound { up: 0, across: 0 }));
        assert!(matches!(args[0], Code::Bound { up: 0, across: 1 }));
        match &args[1] {
          Code::Lam { body, .. } => match &**body {
            Code::App { func, args } => {
              assert!(matches!(**func, Code::Bound { up: 1, across: 0 }));
              assert!(matches!(args[0], Code::Bound { up: 0, across: 0 }));
              assert!(matches!(args[1], Code::Bound { up: 1, across: 1 }));
            }
            other => panic!("inner body {:?}", other),
          },
          other => panic!("second argument {:?}", other),
        }
      }
      other => panic!("body {:?}", other),
    }
  }

  #[test]
  fn unbound_names_are_errors() {
    let env = Env::new();
    let term = read_term("[x. y]").unwrap();
    assert!(env.resolve(&term).is_err());
  }

  #[test]
  fn literal_globals_inline() {
    use crate::runtime::flatten::{GlobalRef, Globals};
    use crate::runtime::store::{Literal, Store};
    let mut store = Store::new(64);
    let mut env = Env::new();
    let mut flags = GlobalFlags::transparent();
    flags.literal = true;
    let term = read_term("42").unwrap();
    let ix = env.define(&mut store, "ANSWER", &term, flags).unwrap();
    match env.global_value(ix) {
      GlobalRef::Literal(Literal::Num(42)) => {}
      _ => panic!("ANSWER did not inline"),
    }
    // A non-literal body under the literal flag is refused.
    let term = read_term("[x. x]").unwrap();
    assert!(env.define(&mut store, "BAD", &term, flags).is_err());
  }

  #[test]
  fn globals_resolve_by_index() {
    let mut env = Env::new();
    let y = env.define_opaque("y");
    let term = read_term("([x. x] y)").unwrap();
    let code = env.resolve(&term).unwrap();
    match code {
      Code::App { args, .. } => assert!(matches!(args[0], Code::Free { index } if index == y)),
      other => panic!("resolved to {:?}", other),
    }
  }
}
