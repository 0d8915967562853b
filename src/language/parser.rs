// Parser
// ------
//
// Recursive descent over a cursor. Alternatives that share a prefix (the
// `[` of abstractions and conditionals) are tried with a saved index and
// rolled back, so failures stay recoverable until only one branch can be
// meant; errors carry a highlighted span of the source.

use crate::language::syntax::{Oper, Term};
use highlight_error::highlight_error;

pub struct TermParser<'i> {
  pub input: &'i str,
  pub index: usize,
}

// Reads one term, requiring it to consume the whole input.
pub fn read_term(code: &str) -> Result<Term, String> {
  let mut parser = TermParser::new(code);
  let term = parser.parse_term()?;
  parser.skip_trivia();
  if parser.index != parser.input.len() {
    return parser.expected("end of input");
  }
  Ok(term)
}

// Reads a definitions file: `Name = term` entries.
pub fn read_defs(code: &str) -> Result<Vec<(String, Term)>, String> {
  let mut parser = TermParser::new(code);
  let mut defs = Vec::new();
  loop {
    parser.skip_trivia();
    if parser.index == parser.input.len() {
      return Ok(defs);
    }
    let name = parser.parse_name()?;
    parser.consume("=")?;
    let term = parser.parse_term()?;
    defs.push((name, term));
  }
}

impl<'i> TermParser<'i> {
  pub fn new(input: &'i str) -> Self {
    TermParser { input, index: 0 }
  }

  // Cursor
  // ------

  fn rest(&self) -> &'i str {
    &self.input[self.index..]
  }

  fn peek_one(&self) -> Option<char> {
    self.rest().chars().next()
  }

  fn advance_one(&mut self) -> Option<char> {
    let got = self.peek_one()?;
    self.index += got.len_utf8();
    Some(got)
  }

  fn skip_trivia(&mut self) {
    loop {
      let rest = self.rest();
      if rest.starts_with("//") {
        let skip = rest.find('\n').unwrap_or(rest.len());
        self.index += skip;
        continue;
      }
      match self.peek_one() {
        Some(c) if c.is_whitespace() => {
          self.advance_one();
        }
        _ => return,
      }
    }
  }

  fn try_consume(&mut self, text: &str) -> bool {
    self.skip_trivia();
    if self.rest().starts_with(text) {
      self.index += text.len();
      true
    } else {
      false
    }
  }

  fn consume(&mut self, text: &str) -> Result<(), String> {
    if self.try_consume(text) {
      Ok(())
    } else {
      self.expected(&format!("'{}'", text))
    }
  }

  fn expected<T>(&self, what: &str) -> Result<T, String> {
    if self.input.is_empty() {
      return Err(format!("expected {}, found end of input", what));
    }
    let ini = if self.index >= self.input.len() {
      self.input.char_indices().last().map(|(i, _)| i).unwrap_or(0)
    } else {
      self.index
    };
    let width = self.input[ini..].chars().next().map_or(1, |c| c.len_utf8());
    let end = (ini + width).min(self.input.len());
    Err(format!("expected {}:\n{}", what, highlight_error(ini, end, self.input)))
  }

  fn take_while(&mut self, cond: impl Fn(char) -> bool) -> &'i str {
    let ini = self.index;
    while let Some(c) = self.peek_one() {
      if cond(c) {
        self.advance_one();
      } else {
        break;
      }
    }
    &self.input[ini..self.index]
  }

  // Terms
  // -----

  pub fn parse_term(&mut self) -> Result<Term, String> {
    self.skip_trivia();
    match self.peek_one() {
      Some('[') => self.parse_bracket(),
      Some('(') => self.parse_paren(),
      Some('{') => self.parse_let(),
      Some('<') => self.parse_cell(),
      Some('"') => self.parse_string(),
      Some('#') => self.parse_symbol(),
      Some(c) if c.is_ascii_digit() => self.parse_number(),
      Some('-') if self.peek_digit_after('-') => self.parse_number(),
      Some(c) if is_oper_char(c) => match self.parse_oper_opt() {
        Some(oper) => Ok(Term::Opr { oper }),
        None => self.expected("operator"),
      },
      Some(c) if is_name_char(c) => {
        let name = self.parse_name()?;
        Ok(Term::Var { name })
      }
      _ => self.expected("term"),
    }
  }

  // `[x y. b]`, `[@f x. b]`, or `[p ? t | e]`.
  fn parse_bracket(&mut self) -> Result<Term, String> {
    self.consume("[")?;
    if let Some((fix, pars)) = self.try_parse_binders() {
      let body = Box::new(self.parse_term()?);
      self.consume("]")?;
      return Ok(if fix { Term::Fix { pars, body } } else { Term::Lam { pars, body } });
    }
    let pred = Box::new(self.parse_term()?);
    self.consume("?")?;
    let then = Box::new(self.parse_term()?);
    self.consume("|")?;
    let other = Box::new(self.parse_term()?);
    self.consume("]")?;
    Ok(Term::Tst { pred, then, other })
  }

  // A name list up to a dot, or nothing (rolled back).
  fn try_parse_binders(&mut self) -> Option<(bool, Vec<String>)> {
    let save = self.index;
    let fix = self.try_consume("@");
    let mut pars = Vec::new();
    loop {
      self.skip_trivia();
      match self.peek_one() {
        Some(c) if is_name_char(c) && !c.is_ascii_digit() => {
          pars.push(self.take_while(is_name_char).to_string());
        }
        _ => break,
      }
    }
    if !pars.is_empty() && self.try_consume(".") {
      Some((fix, pars))
    } else {
      self.index = save;
      None
    }
  }

  // `(f a b)`, `(a + b)`, or a parenthesized term.
  fn parse_paren(&mut self) -> Result<Term, String> {
    self.consume("(")?;
    let func = Box::new(self.parse_term()?);
    self.skip_trivia();
    if let Some(oper) = self.parse_oper_opt() {
      let rhs = Box::new(self.parse_term()?);
      self.consume(")")?;
      return Ok(Term::App { func: Box::new(Term::Opr { oper }), args: vec![*func, *rhs].into_iter().map(Box::new).collect() });
    }
    let mut args = Vec::new();
    loop {
      self.skip_trivia();
      if self.peek_one() == Some(')') {
        self.advance_one();
        break;
      }
      args.push(Box::new(self.parse_term()?));
    }
    if args.is_empty() {
      Ok(*func)
    } else {
      Ok(Term::App { func, args })
    }
  }

  // `{x = e, y = e. body}`.
  fn parse_let(&mut self) -> Result<Term, String> {
    self.consume("{")?;
    let mut defs = Vec::new();
    loop {
      self.skip_trivia();
      let name = self.parse_name()?;
      self.consume("=")?;
      let term = Box::new(self.parse_term()?);
      defs.push((name, term));
      if self.try_consume(",") {
        continue;
      }
      self.consume(".")?;
      break;
    }
    let body = Box::new(self.parse_term()?);
    self.consume("}")?;
    Ok(Term::Let { defs, body })
  }

  // `<a, b, c>`.
  fn parse_cell(&mut self) -> Result<Term, String> {
    self.consume("<")?;
    let mut items = Vec::new();
    loop {
      items.push(Box::new(self.parse_term()?));
      if self.try_consume(",") {
        continue;
      }
      self.consume(">")?;
      break;
    }
    Ok(Term::Cel { items })
  }

  fn parse_string(&mut self) -> Result<Term, String> {
    self.consume("\"")?;
    let mut text = String::new();
    loop {
      match self.advance_one() {
        Some('"') => return Ok(Term::Str { text }),
        Some('\\') => match self.advance_one() {
          Some('n') => text.push('\n'),
          Some('t') => text.push('\t'),
          Some(c) => text.push(c),
          None => return self.expected("escape character"),
        },
        Some(c) => text.push(c),
        None => return self.expected("closing '\"'"),
      }
    }
  }

  fn parse_symbol(&mut self) -> Result<Term, String> {
    self.consume("#")?;
    let name = self.parse_name()?;
    Ok(Term::Sym { name })
  }

  fn parse_number(&mut self) -> Result<Term, String> {
    self.skip_trivia();
    let ini = self.index;
    let negative = self.try_consume("-");
    let digits = self.take_while(|c| c.is_ascii_digit());
    let end = self.index;
    let numb: i64 = digits
      .parse()
      .map_err(|err| format!("invalid number literal: {}\n{}", err, highlight_error(ini, end, self.input)))?;
    Ok(Term::Num { numb: if negative { -numb } else { numb } })
  }

  pub fn parse_name(&mut self) -> Result<String, String> {
    self.skip_trivia();
    let name = self.take_while(is_name_char);
    if name.is_empty() {
      self.expected("name")
    } else {
      Ok(name.to_string())
    }
  }

  fn parse_oper_opt(&mut self) -> Option<Oper> {
    self.skip_trivia();
    let two = [
      ("==", Oper::Eql),
      ("!=", Oper::Neq),
      ("<=", Oper::Lte),
      (">=", Oper::Gte),
    ];
    for (text, oper) in two {
      if self.rest().starts_with(text) {
        self.index += text.len();
        return Some(oper);
      }
    }
    let one = [
      ("+", Oper::Add),
      ("-", Oper::Sub),
      ("*", Oper::Mul),
      ("/", Oper::Div),
      ("%", Oper::Mod),
      ("<", Oper::Ltn),
      (">", Oper::Gtn),
    ];
    for (text, oper) in one {
      if self.rest().starts_with(text) {
        self.index += text.len();
        return Some(oper);
      }
    }
    None
  }

  fn peek_digit_after(&self, prefix: char) -> bool {
    let mut chars = self.rest().chars();
    chars.next() == Some(prefix) && chars.next().map_or(false, |c| c.is_ascii_digit())
  }
}

fn is_name_char(c: char) -> bool {
  c.is_alphanumeric() || c == '_'
}

fn is_oper_char(c: char) -> bool {
  matches!(c, '+' | '-' | '*' | '/' | '%' | '=' | '!' | '<' | '>')
}
