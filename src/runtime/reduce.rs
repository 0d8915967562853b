// The reducer
// -----------
//
// A single explicit automaton drives reduction; nothing recurses over the
// term's structure. Each chain goes through two directions:
//
// - scan (right to left): walks from the sentinel's rightmost member
//   leftward firing redexes as they appear: application of an abstraction
//   or fixpoint, let, conditional with a settled predicate, primitive
//   application over literals. Rename nodes met on the way are spliced out
//   so they cannot hide a redex one hop away. Every 256 steps the store's
//   pressure is checked against its threshold and a full collection runs
//   when it is exceeded.
// - sweep (left to right): collects members whose reference count reached
//   zero, and, in deep mode, pushes the current position onto an explicit
//   outer stack to recurse the whole two-direction process into
//   abstraction and test bodies not yet visited. Surface mode never
//   descends, giving weak-head-style results.
//
// The automaton halts when a sweep reaches the depth-0 sentinel with the
// outer stack empty. Any malformed shape met on the way is a defect in the
// flattener or substitution engine and panics.

use crate::language::syntax::Oper;
use crate::runtime::beta::{fire_beta, fire_let, replace_redex, restore_backref};
use crate::runtime::debug::show_node;
use crate::runtime::store::{Backref, Ix, Literal, Slot, Store, Variety};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
  // Reduce everywhere, including unapplied bodies.
  Deep,
  // Stop at the surface: do not enter unapplied bodies.
  Surface,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
  Scan,
  Sweep,
}

struct Frame {
  head: Ix,
  at: Ix,
  phase: Phase,
}

const PRESSURE_PERIOD: u64 = 256;

// Reduces the chain under `root` to normal form (deep) or surface form.
// `fuel` bounds the number of rule firings, 0 meaning unbounded; the graph
// is left consistent when fuel runs out mid-way. Returns firings done.
pub fn reduce(store: &mut Store, root: Ix, mode: Mode, trace: bool, fuel: u64) -> u64 {
  let start = store.rewrites;
  let mut ticks: u64 = 0;
  let mut outer: Vec<Frame> = Vec::new();
  let mut head = root;
  let mut at = store.node(root).prior;
  let mut phase = Phase::Scan;

  'machine: loop {
    match phase {
      Phase::Scan => {
        if at == head {
          #[cfg(feature = "sanity")]
          crate::runtime::debug::audit(store, &[root]).unwrap_or_else(|err| {
            panic!("reduce: graph corrupt after scan: {}", err);
          });
          phase = Phase::Sweep;
          at = store.node(head).next;
          continue 'machine;
        }
        ticks += 1;
        if ticks % PRESSURE_PERIOD == 0 && store.pressure() >= store.threshold() {
          let mut pinned: Vec<Ix> = vec![head, at];
          for frame in &outer {
            pinned.push(frame.head);
            pinned.push(frame.at);
          }
          store.collect(&[root], &pinned);
          if trace {
            println!("[reduce] collect: {} live, threshold {:.2}", store.live(), store.threshold());
          }
        }
        if fuel != 0 && store.rewrites - start >= fuel {
          break 'machine;
        }

        let node = at;
        let left = store.node(node).prior;
        let variety = store.node(node).variety;
        if trace {
          println!("[reduce] scan  {}", show_node(store, node));
        }
        // Unreferenced members are the sweep's to collect, not ours to fire.
        if store.node(node).refs == 0 {
          at = left;
          continue 'machine;
        }
        match variety {
          Variety::Var => {
            eliminate_rename(store, node);
            at = left;
          }
          Variety::Let => {
            at = fire_let(store, node);
            if trace {
              println!("[reduce] let fired");
            }
          }
          Variety::App => {
            at = match app_redex(store, node) {
              AppRule::Beta(func) => fire_beta(store, node, func),
              AppRule::Prim(oper, a, b) => {
                fire_prim(store, node, oper, a, b);
                left
              }
              AppRule::Inert => left,
            };
          }
          Variety::Tst => {
            at = match test_truth(store, node) {
              Some(truth) => fire_test(store, node, truth),
              None => left,
            };
          }
          _ => {
            at = left;
          }
        }
      }
      Phase::Sweep => {
        if at == head {
          #[cfg(feature = "sanity")]
          crate::runtime::debug::audit(store, &[root]).unwrap_or_else(|err| {
            panic!("reduce: graph corrupt after sweep: {}", err);
          });
          store.node_mut(head).visited = true;
          match outer.pop() {
            Some(frame) => {
              head = frame.head;
              // A collection can have taken the saved cursor; restart the
              // saved direction from its sentinel.
              at = if store.is_live(frame.at) {
                frame.at
              } else {
                match frame.phase {
                  Phase::Scan => store.node(frame.head).prior,
                  Phase::Sweep => store.node(frame.head).next,
                }
              };
              phase = frame.phase;
              continue 'machine;
            }
            None => break 'machine,
          }
        }
        let node = at;
        let next = store.node(node).next;
        if store.node(node).refs == 0 {
          if trace {
            println!("[reduce] sweep frees {}", show_node(store, node));
          }
          store.unlink(node);
          store.free_graph(node);
          at = next;
          continue 'machine;
        }
        if mode == Mode::Deep {
          let bodies = enterable_bodies(store, node);
          if !bodies.is_empty() {
            // Save the rightward continuation, then run the whole
            // two-direction process inside each body in turn.
            outer.push(Frame { head, at: next, phase: Phase::Sweep });
            for &extra in bodies.iter().skip(1).rev() {
              outer.push(Frame { head: extra, at: store.node(extra).prior, phase: Phase::Scan });
            }
            head = bodies[0];
            at = store.node(head).prior;
            phase = Phase::Scan;
            continue 'machine;
          }
        }
        at = next;
      }
    }
  }
  store.rewrites - start
}

// Bodies the sweep still has to enter under a node.
fn enterable_bodies(store: &Store, node: Ix) -> Vec<Ix> {
  let n = store.node(node);
  let mut heads: Vec<Ix> = Vec::new();
  match n.variety {
    Variety::Abs | Variety::Fix | Variety::Let => heads.push(n.body()),
    Variety::Tst => {
      for slot in &n.slots[1..] {
        if let Slot::Sub { node } = slot {
          heads.push(*node);
        }
      }
    }
    _ => {}
  }
  heads.retain(|&h| store.node(h).variety == Variety::Head && !store.node(h).visited);
  heads
}

// Rename elimination
// ------------------

// A Var node holding a substitution is a pure alias. With a known unique
// referrer it is spliced out; with none it is garbage; with several it
// stays (redex detection sees through it regardless).
fn eliminate_rename(store: &mut Store, node: Ix) {
  let slot = store.node(node).slots[0].clone();
  let refs = store.node(node).refs;
  let backref = store.node(node).backref;
  if refs == 0 {
    store.unlink(node);
    store.free_graph(node);
    return;
  }
  if backref.is_none() {
    return;
  }
  match slot {
    Slot::Sub { node: target } => {
      // Transfer the alias's claim on the target to the referrer.
      store.node_mut(backref.node).slots[backref.slot as usize] = Slot::Sub { node: target };
      let t = store.node_mut(target);
      if t.backref == Backref::at(node, 0) {
        t.backref = backref;
      }
      let n = store.node_mut(node);
      n.refs = 0;
      n.backref = crate::runtime::store::NO_BACKREF;
      n.slots.clear();
      store.unlink(node);
      store.free_graph(node);
    }
    Slot::Bound { .. } | Slot::Global { .. } | Slot::Lit { .. } => {
      // A wrapped bare reference can collapse into its referrer's slot,
      // except a sentinel entry, which must stay a substitution. A bound
      // index is only meaningful at the wrapper's own depth.
      if store.node(backref.node).variety == Variety::Head {
        return;
      }
      if matches!(slot, Slot::Bound { .. })
        && store.node(backref.node).depth != store.node(node).depth
      {
        return;
      }
      store.node_mut(backref.node).slots[backref.slot as usize] = slot;
      let n = store.node_mut(node);
      n.refs = 0;
      n.backref = crate::runtime::store::NO_BACKREF;
      store.unlink(node);
      store.free_graph(node);
    }
    other => panic!("reduce::eliminate_rename: wrapper holds {:?}", other),
  }
}

// Redex detection
// ---------------

enum AppRule {
  Beta(Ix),
  Prim(Oper, Literal, Literal),
  Inert,
}

// Follows rename aliases without mutating anything.
fn chase(store: &Store, mut target: Ix) -> Ix {
  loop {
    let node = store.node(target);
    if node.variety == Variety::Var {
      if let Slot::Sub { node: next } = node.slots[0] {
        target = next;
        continue;
      }
    }
    return target;
  }
}

// The literal a slot settles to, if any, seen through renames and value
// wrappers.
fn settled_literal(store: &Store, slot: &Slot) -> Option<Literal> {
  match slot {
    Slot::Lit { val } => Some(val.clone()),
    Slot::Sub { node } => {
      let target = chase(store, *node);
      let n = store.node(target);
      match n.variety {
        Variety::Val | Variety::Var => match &n.slots[0] {
          Slot::Lit { val } => Some(val.clone()),
          _ => None,
        },
        _ => None,
      }
    }
    _ => None,
  }
}

fn app_redex(store: &Store, node: Ix) -> AppRule {
  let func = &store.node(node).slots[0];
  let oper = match func {
    Slot::Sub { node: target } => {
      let target = chase(store, *target);
      match store.node(target).variety {
        Variety::Abs | Variety::Fix => return AppRule::Beta(target),
        Variety::Val => match &store.node(target).slots[0] {
          Slot::Lit { val: Literal::Opr(oper) } => *oper,
          _ => return AppRule::Inert,
        },
        _ => return AppRule::Inert,
      }
    }
    Slot::Lit { val: Literal::Opr(oper) } => *oper,
    _ => return AppRule::Inert,
  };
  if store.node(node).slots.len() != 3 {
    return AppRule::Inert;
  }
  let a = settled_literal(store, &store.node(node).slots[1]);
  let b = settled_literal(store, &store.node(node).slots[2]);
  match (a, b) {
    (Some(a), Some(b)) => match prim_result(oper, &a, &b) {
      Some(_) => AppRule::Prim(oper, a, b),
      None => AppRule::Inert,
    },
    _ => AppRule::Inert,
  }
}

// Primitive application
// ---------------------

fn prim_result(oper: Oper, a: &Literal, b: &Literal) -> Option<Literal> {
  use Literal::{Num, Str, Sym};
  let truth = |ok: bool| Some(Num(ok as i64));
  match (a, b) {
    (Num(a), Num(b)) => match oper {
      Oper::Add => Some(Num(a.wrapping_add(*b))),
      Oper::Sub => Some(Num(a.wrapping_sub(*b))),
      Oper::Mul => Some(Num(a.wrapping_mul(*b))),
      Oper::Div => a.checked_div(*b).map(Num),
      Oper::Mod => a.checked_rem(*b).map(Num),
      Oper::Ltn => truth(a < b),
      Oper::Lte => truth(a <= b),
      Oper::Gtn => truth(a > b),
      Oper::Gte => truth(a >= b),
      Oper::Eql => truth(a == b),
      Oper::Neq => truth(a != b),
    },
    (Str(a), Str(b)) => match oper {
      Oper::Eql => truth(a == b),
      Oper::Neq => truth(a != b),
      _ => None,
    },
    (Sym(a), Sym(b)) => match oper {
      Oper::Eql => truth(a == b),
      Oper::Neq => truth(a != b),
      _ => None,
    },
    _ => None,
  }
}

// Rewrites the application into the literal it computes, in place: the
// node keeps its chain position, count and backref, so referrers are
// untouched.
fn fire_prim(store: &mut Store, node: Ix, oper: Oper, a: Literal, b: Literal) {
  let val = match prim_result(oper, &a, &b) {
    Some(val) => val,
    None => panic!("reduce::fire_prim: {} over non-numeric operands", oper),
  };
  let slots = std::mem::take(&mut store.node_mut(node).slots);
  for (i, slot) in slots.iter().enumerate() {
    if let Slot::Sub { node: target } = slot {
      store.release(*target, Backref::at(node, i));
    }
  }
  let n = store.node_mut(node);
  n.variety = Variety::Val;
  n.slots = vec![Slot::Lit { val }];
  store.rewrites += 1;
}

// Conditional selection
// ---------------------

fn test_truth(store: &Store, node: Ix) -> Option<bool> {
  match settled_literal(store, &store.node(node).slots[0]) {
    Some(Literal::Num(n)) => Some(n != 0),
    _ => None,
  }
}

// Splices the selected branch in place of the test node. The rejected
// branch's whole chain dies here, not at some later sweep.
fn fire_test(store: &mut Store, node: Ix, truth: bool) -> Ix {
  let left_anchor = store.node(node).prior;
  let selected = match &store.node(node).slots[if truth { 1 } else { 2 }] {
    Slot::Sub { node } => *node,
    other => panic!("reduce::fire_test: branch slot holds {:?}", other),
  };
  let (segment, root) = crate::runtime::beta::consume_chain(store, selected);
  let (resume, root_ref) = replace_redex(store, node, segment, root, 0, left_anchor, Vec::new());
  restore_backref(store, root, root_ref);
  store.rewrites += 1;
  resume
}
