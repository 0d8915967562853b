// Readback
// --------
//
// Walks a reduced graph depth-first and rebuilds a surface term. Two
// complications:
//
// - Bound indices. The traversal's binder stack only grows along the path
//   it walked, but a substitution can jump into a node built at a strictly
//   lower abstraction depth; variables that climb out of that region must
//   skip the binders the jump bypassed. Each such crossing pushes a shift
//   record (amount = depth difference, cutoff = binder count at the
//   crossing); a variable's up-index is corrected by every applicable
//   record, newest first.
//
// - Unsharing. A node referenced n times is read back n times, so a
//   heavily shared graph can explode exponentially. The walk counts the
//   term nodes it emits and truncates with a pruned placeholder once the
//   count passes an N log N budget over the store's live size.
//
// Abstraction binders keep their stored formal names; let binders carry
// none and are synthesized fresh.

use crate::language::syntax::Term;
use crate::runtime::flatten::Globals;
use crate::runtime::store::{Ix, Literal, Slot, Store, Variety};

struct Shift {
  amount: u32,
  cutoff: usize,
}

struct ReadCtx<'a, G: Globals> {
  store: &'a Store,
  globals: &'a G,
  names: Vec<Vec<String>>,
  shifts: Vec<Shift>,
  gensym: u64,
  emitted: u64,
  budget: u64,
}

// Reads the term under a chain sentinel back into a tree.
pub fn unflatten<G: Globals>(store: &Store, globals: &G, head: Ix) -> Term {
  let live = store.live().max(2) as u64;
  let budget = 256 + 2 * live * (64 - live.leading_zeros() as u64);
  let mut ctx = ReadCtx {
    store,
    globals,
    names: Vec::new(),
    shifts: Vec::new(),
    gensym: 0,
    emitted: 0,
    budget,
  };
  read_node(&mut ctx, head)
}

fn read_node<G: Globals>(ctx: &mut ReadCtx<G>, ix: Ix) -> Term {
  ctx.emitted += 1;
  if ctx.emitted > ctx.budget {
    return Term::Pruned;
  }
  let node = ctx.store.node(ix);
  let cur = node.depth;
  match node.variety {
    Variety::Head => read_slot(ctx, cur, &node.slots[0]),
    Variety::Var => read_slot(ctx, cur, &node.slots[0]),
    Variety::Val => match &node.slots[0] {
      Slot::Lit { val } => lit_term(val),
      other => panic!("unflatten::read_node: value node holds {:?}", other),
    },
    Variety::Abs | Variety::Fix => {
      let pars: Vec<String> = node.slots[..node.body_slot()]
        .iter()
        .map(|slot| match slot {
          Slot::Param { name } => name.clone(),
          other => panic!("unflatten::read_node: formal slot holds {:?}", other),
        })
        .collect();
      let body_slot = node.slots[node.body_slot()].clone();
      ctx.names.push(pars.clone());
      let body = Box::new(read_slot(ctx, cur, &body_slot));
      ctx.names.pop();
      if node.variety == Variety::Abs {
        Term::Lam { pars, body }
      } else {
        Term::Fix { pars, body }
      }
    }
    Variety::Let => {
      let ndefs = node.body_slot();
      let mut defs: Vec<(String, Box<Term>)> = Vec::with_capacity(ndefs);
      let mut group: Vec<String> = Vec::with_capacity(ndefs);
      for i in 0..ndefs {
        let slot = ctx.store.node(ix).slots[i].clone();
        let name = format!("g{}", ctx.gensym);
        ctx.gensym += 1;
        let term = read_slot(ctx, cur, &slot);
        defs.push((name.clone(), Box::new(term)));
        group.push(name);
      }
      let body_slot = ctx.store.node(ix).slots[ndefs].clone();
      ctx.names.push(group);
      let body = Box::new(read_slot(ctx, cur, &body_slot));
      ctx.names.pop();
      Term::Let { defs, body }
    }
    Variety::App => {
      let slots = node.slots.clone();
      let func = Box::new(read_slot(ctx, cur, &slots[0]));
      let args = slots[1..].iter().map(|s| Box::new(read_slot(ctx, cur, s))).collect();
      Term::App { func, args }
    }
    Variety::Tst => {
      let slots = node.slots.clone();
      let pred = Box::new(read_slot(ctx, cur, &slots[0]));
      let then = Box::new(read_slot(ctx, cur, &slots[1]));
      let other = Box::new(read_slot(ctx, cur, &slots[2]));
      Term::Tst { pred, then, other }
    }
    Variety::Cel => {
      let slots = node.slots.clone();
      let items = slots.iter().map(|s| Box::new(read_slot(ctx, cur, s))).collect();
      Term::Cel { items }
    }
  }
}

fn read_slot<G: Globals>(ctx: &mut ReadCtx<G>, cur: u32, slot: &Slot) -> Term {
  match slot {
    Slot::Bound { up, across } => read_bound(ctx, *up, *across),
    Slot::Global { index } => Term::Var { name: ctx.globals.global_name(*index) },
    Slot::Lit { val } => lit_term(val),
    Slot::Sub { node } => {
      let depth = ctx.store.node(*node).depth;
      if depth < cur {
        ctx.shifts.push(Shift { amount: cur - depth, cutoff: ctx.names.len() });
        let term = read_node(ctx, *node);
        ctx.shifts.pop();
        term
      } else {
        read_node(ctx, *node)
      }
    }
    other => panic!("unflatten::read_slot: {:?} in value position", other),
  }
}

fn read_bound<G: Globals>(ctx: &ReadCtx<G>, up: u32, across: u32) -> Term {
  let len = ctx.names.len();
  let mut u = up as usize;
  for shift in ctx.shifts.iter().rev() {
    if u >= len - shift.cutoff {
      u += shift.amount as usize;
    }
  }
  if u >= len {
    // A free variable cannot reach the engine; showing it beats dying in
    // a printer.
    return Term::Var { name: format!("^{}.{}", up, across) };
  }
  let group = &ctx.names[len - 1 - u];
  match group.get(across as usize) {
    Some(name) => Term::Var { name: name.clone() },
    None => Term::Var { name: format!("^{}.{}", up, across) },
  }
}

fn lit_term(val: &Literal) -> Term {
  match val {
    Literal::Num(numb) => Term::Num { numb: *numb },
    Literal::Str(text) => Term::Str { text: text.clone() },
    Literal::Sym(name) => Term::Sym { name: name.clone() },
    Literal::Opr(oper) => Term::Opr { oper: *oper },
  }
}
