// Flattening
// ----------
//
// Turns a name-resolved term tree into sentinel-headed chains. One chain per
// abstraction/fixpoint/let body (one binder level deeper) and per test
// branch (same level); inside a body, every nested non-reference
// subexpression is hoisted to the right of the node that refers to it, so
// the chain reads root-first, operands rightward, all at one depth. Bare
// references (bound variables, opaque globals, literals) become slots of
// their parent node and allocate nothing.

use crate::runtime::store::{Backref, Ix, Literal, Slot, Store, Variety};

// Resolved terms
// --------------

// The engine's input: all binding is positional. Let definitions carry no
// names (readback synthesizes them); abstraction formals keep theirs.
#[derive(Clone, Debug)]
pub enum Code {
  Bound { up: u32, across: u32 },
  Free { index: u32 },
  Lit { val: Literal },
  Lam { pars: Vec<String>, body: Box<Code> },
  Fix { pars: Vec<String>, body: Box<Code> },
  App { func: Box<Code>, args: Vec<Code> },
  Let { defs: Vec<Code>, body: Box<Code> },
  Tst { pred: Box<Code>, then: Box<Code>, other: Box<Code> },
  Cel { items: Vec<Code> },
}

// The external global environment, seen from the engine side: an opaque
// handle keyed by a small integer index.
pub trait Globals {
  fn global_value(&self, index: u32) -> GlobalRef;
  fn global_name(&self, index: u32) -> String;
}

pub enum GlobalRef {
  // Never expanded; stays a Global slot.
  Opaque,
  // Inlined as a literal slot.
  Literal(Literal),
  // Substitution to the already-built value graph, intentionally shared.
  Value(Ix),
}

// A flattened subterm, before its referring slot exists.
enum Raw {
  Leaf(Slot),
  Owned(Ix),
  Shared(Ix),
}

// Chain building
// --------------

fn append(store: &mut Store, head: Ix, ix: Ix) {
  let pos = store.node(head).prior;
  store.insert_segment_after(pos, ix, ix);
}

fn install(store: &mut Store, owner: Ix, idx: usize, raw: Raw) -> Slot {
  match raw {
    Raw::Leaf(slot) => slot,
    Raw::Owned(node) => {
      store.add_ref(node, Backref::at(owner, idx));
      Slot::Sub { node }
    }
    Raw::Shared(node) => {
      store.share_ref(node);
      Slot::Sub { node }
    }
  }
}

// Flattens a closed resolved term into a depth-0 chain and returns its
// sentinel.
pub fn flatten<G: Globals>(store: &mut Store, globals: &G, code: &Code) -> Ix {
  flatten_chain(store, globals, code, 0)
}

fn flatten_chain<G: Globals>(store: &mut Store, globals: &G, code: &Code, depth: u32) -> Ix {
  let head = store.new_chain(depth);
  let raw = flatten_into(store, globals, code, depth, head);
  let entry = match raw {
    Raw::Leaf(slot) => {
      let wrapped = store.wrap(slot, depth);
      append(store, head, wrapped);
      install(store, head, 0, Raw::Owned(wrapped))
    }
    raw => install(store, head, 0, raw),
  };
  store.node_mut(head).slots[0] = entry;
  head
}

fn flatten_into<G: Globals>(
  store: &mut Store,
  globals: &G,
  code: &Code,
  depth: u32,
  chain: Ix,
) -> Raw {
  match code {
    Code::Bound { up, across } => Raw::Leaf(Slot::Bound { up: *up, across: *across }),
    Code::Lit { val } => Raw::Leaf(Slot::Lit { val: val.clone() }),
    Code::Free { index } => match globals.global_value(*index) {
      GlobalRef::Opaque => Raw::Leaf(Slot::Global { index: *index }),
      GlobalRef::Literal(val) => Raw::Leaf(Slot::Lit { val }),
      GlobalRef::Value(root) => Raw::Shared(root),
    },
    Code::Lam { pars, body } => {
      Raw::Owned(flatten_binder(store, globals, Variety::Abs, pars, body, depth, chain))
    }
    Code::Fix { pars, body } => {
      Raw::Owned(flatten_binder(store, globals, Variety::Fix, pars, body, depth, chain))
    }
    Code::App { func, args } => {
      let ix = store.alloc(Variety::App, depth, Vec::new());
      append(store, chain, ix);
      let mut raws = vec![flatten_into(store, globals, func, depth, chain)];
      for arg in args {
        raws.push(flatten_into(store, globals, arg, depth, chain));
      }
      let slots = raws
        .into_iter()
        .enumerate()
        .map(|(i, raw)| install(store, ix, i, raw))
        .collect();
      store.node_mut(ix).slots = slots;
      Raw::Owned(ix)
    }
    Code::Let { defs, body } => {
      let ix = store.alloc(Variety::Let, depth, Vec::new());
      append(store, chain, ix);
      let mut raws = Vec::new();
      for def in defs {
        raws.push(flatten_into(store, globals, def, depth, chain));
      }
      let mut slots: Vec<Slot> = raws
        .into_iter()
        .enumerate()
        .map(|(i, raw)| install(store, ix, i, raw))
        .collect();
      let bhead = flatten_chain(store, globals, body, depth + 1);
      store.add_ref(bhead, Backref::at(ix, slots.len()));
      slots.push(Slot::Sub { node: bhead });
      store.node_mut(ix).slots = slots;
      Raw::Owned(ix)
    }
    Code::Tst { pred, then, other } => {
      let ix = store.alloc(Variety::Tst, depth, Vec::new());
      append(store, chain, ix);
      let praw = flatten_into(store, globals, pred, depth, chain);
      let pslot = install(store, ix, 0, praw);
      let thead = flatten_chain(store, globals, then, depth);
      store.add_ref(thead, Backref::at(ix, 1));
      let ohead = flatten_chain(store, globals, other, depth);
      store.add_ref(ohead, Backref::at(ix, 2));
      store.node_mut(ix).slots =
        vec![pslot, Slot::Sub { node: thead }, Slot::Sub { node: ohead }];
      Raw::Owned(ix)
    }
    Code::Cel { items } => {
      let ix = store.alloc(Variety::Cel, depth, Vec::new());
      append(store, chain, ix);
      let mut raws = Vec::new();
      for item in items {
        raws.push(flatten_into(store, globals, item, depth, chain));
      }
      let slots = raws
        .into_iter()
        .enumerate()
        .map(|(i, raw)| install(store, ix, i, raw))
        .collect();
      store.node_mut(ix).slots = slots;
      Raw::Owned(ix)
    }
  }
}

fn flatten_binder<G: Globals>(
  store: &mut Store,
  globals: &G,
  variety: Variety,
  pars: &[String],
  body: &Code,
  depth: u32,
  chain: Ix,
) -> Ix {
  let ix = store.alloc(variety, depth, Vec::new());
  append(store, chain, ix);
  let mut slots: Vec<Slot> =
    pars.iter().map(|name| Slot::Param { name: name.clone() }).collect();
  let bhead = flatten_chain(store, globals, body, depth + 1);
  store.add_ref(bhead, Backref::at(ix, slots.len()));
  slots.push(Slot::Sub { node: bhead });
  store.node_mut(ix).slots = slots;
  ix
}

// An environment with no globals at all; resolution guarantees tests that
// use it never emit Free references.
pub struct NoGlobals;

impl Globals for NoGlobals {
  fn global_value(&self, _index: u32) -> GlobalRef {
    GlobalRef::Opaque
  }

  fn global_name(&self, index: u32) -> String {
    format!("${}", index)
  }
}
