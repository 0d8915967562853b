// Types
// =====

// Term
// ----

// The surface language. `[x y. b]` abstracts, `[@f x. b]` abstracts with a
// self-binder, `(f a b)` applies, `(a + b)` applies a primitive infix,
// `{x = e, y = e. b}` binds, `[p ? t | e]` tests, `<a, b>` builds a cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
  Var { name: String },
  Lam { pars: Vec<String>, body: Box<Term> },
  Fix { pars: Vec<String>, body: Box<Term> },
  App { func: Box<Term>, args: Vec<Box<Term>> },
  Let { defs: Vec<(String, Box<Term>)>, body: Box<Term> },
  Tst { pred: Box<Term>, then: Box<Term>, other: Box<Term> },
  Cel { items: Vec<Box<Term>> },
  Num { numb: i64 },
  Str { text: String },
  Sym { name: String },
  Opr { oper: Oper },
  // Stands in for subgraphs the readback refused to unshare.
  Pruned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Oper {
  Add, Sub, Mul, Div,
  Mod, Ltn, Lte, Gtn,
  Gte, Eql, Neq,
}

// Stringifier
// ===========

impl std::fmt::Display for Oper {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", match self {
      Self::Add => "+",
      Self::Sub => "-",
      Self::Mul => "*",
      Self::Div => "/",
      Self::Mod => "%",
      Self::Ltn => "<",
      Self::Lte => "<=",
      Self::Gtn => ">",
      Self::Gte => ">=",
      Self::Eql => "==",
      Self::Neq => "!=",
    })
  }
}

impl std::fmt::Display for Term {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Term::Var { name } => write!(f, "{}", name),
      Term::Lam { pars, body } => write!(f, "[{}. {}]", pars.join(" "), body),
      Term::Fix { pars, body } => {
        let mut names = pars.clone();
        if let Some(first) = names.first_mut() {
          *first = format!("@{}", first);
        }
        write!(f, "[{}. {}]", names.join(" "), body)
      }
      Term::App { func, args } => {
        // Binary primitive applications print back as infix.
        if let Term::Opr { oper } = &**func {
          if args.len() == 2 {
            return write!(f, "({} {} {})", args[0], oper, args[1]);
          }
        }
        write!(f, "({}", func)?;
        for arg in args {
          write!(f, " {}", arg)?;
        }
        write!(f, ")")
      }
      Term::Let { defs, body } => {
        write!(f, "{{")?;
        for (i, (name, term)) in defs.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{} = {}", name, term)?;
        }
        write!(f, ". {}}}", body)
      }
      Term::Tst { pred, then, other } => write!(f, "[{} ? {} | {}]", pred, then, other),
      Term::Cel { items } => {
        write!(f, "<")?;
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{}", item)?;
        }
        write!(f, ">")
      }
      Term::Num { numb } => write!(f, "{}", numb),
      Term::Str { text } => write!(f, "{:?}", text),
      Term::Sym { name } => write!(f, "#{}", name),
      Term::Opr { oper } => write!(f, "{}", oper),
      Term::Pruned => write!(f, "..."),
    }
  }
}

// Numeral helper
// ==============

// Recognizes a Church numeral: two binders (possibly split over nested
// abstractions) and a body of the shape (f (f ... (f x))).
pub fn as_numeral(term: &Term) -> Option<u64> {
  fn binders(term: &Term, names: &mut Vec<String>) -> Option<Term> {
    match term {
      Term::Lam { pars, body } => {
        names.extend(pars.iter().cloned());
        if names.len() >= 2 {
          Some((**body).clone())
        } else {
          binders(body, names)
        }
      }
      _ => None,
    }
  }
  let mut names = Vec::new();
  let body = binders(term, &mut names)?;
  if names.len() != 2 {
    return None;
  }
  let f = names[0].clone();
  let x = names[1].clone();
  let mut count = 0u64;
  let mut at = body;
  loop {
    match at {
      Term::Var { ref name } if *name == x => return Some(count),
      Term::App { func, args } => match *func {
        Term::Var { ref name } if *name == f && args.len() == 1 => {
          count += 1;
          at = *args.into_iter().next().unwrap();
        }
        _ => return None,
      },
      _ => return None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn var(name: &str) -> Box<Term> {
    Box::new(Term::Var { name: name.to_string() })
  }

  #[test]
  fn numeral_recognition() {
    // [f x. x] is zero.
    let zero = Term::Lam {
      pars: vec!["f".to_string(), "x".to_string()],
      body: var("x"),
    };
    assert_eq!(as_numeral(&zero), Some(0));
    // [f. [x. (f (f x))]] is two, split over nested binders.
    let two = Term::Lam {
      pars: vec!["f".to_string()],
      body: Box::new(Term::Lam {
        pars: vec!["x".to_string()],
        body: Box::new(Term::App {
          func: var("f"),
          args: vec![Box::new(Term::App { func: var("f"), args: vec![var("x")] })],
        }),
      }),
    };
    assert_eq!(as_numeral(&two), Some(2));
    // [f x. (x f)] is not a numeral.
    let twisted = Term::Lam {
      pars: vec!["f".to_string(), "x".to_string()],
      body: Box::new(Term::App { func: var("x"), args: vec![var("f")] }),
    };
    assert_eq!(as_numeral(&twisted), None);
  }

  #[test]
  fn infix_display() {
    let term = Term::App {
      func: Box::new(Term::Opr { oper: Oper::Eql }),
      args: vec![Box::new(Term::Num { numb: 0 }), Box::new(Term::Num { numb: 0 })],
    };
    assert_eq!(format!("{}", term), "(0 == 0)");
  }
}
