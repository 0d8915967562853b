// Beta / substitution
// -------------------
//
// Fires a redex whose function position resolved to an abstraction,
// fixpoint or let. Two variants produce the reduced body:
//
// - copying: used when the body has other live referrers, or when any
//   argument targets the abstraction itself (self-application), or for
//   fixpoints (substitution reintroduces references). Walks the body chain
//   right to left building a parallel copy; a forwarding side-table maps
//   already-copied nodes so the body's internal sharing survives. When the
//   walk reaches a slot whose target is already forwarded, the fresh
//   substitution still counts a reference on the copy; see the matching
//   property test before touching that increment.
// - destructive: used when the body is provably unshared. Identical index
//   arithmetic, applied in place, with depths rewritten as it walks.
//
// Index arithmetic, for a bound variable at node depth d inside a body
// whose binder level is b, moving to a splice site that shifts depths by
// delta:
//
//   rel = d - up        the binder level the variable climbs to
//   rel > b             inner binder: copied unchanged
//   rel == b            the consumed binder: substituted (or, when the
//                       binder survives a partial application, rebased
//                       across the consumed formals)
//   rel < b             outer binder: up becomes up + delta, which folds
//                       the one-binder elimination and the redex-site
//                       depth difference into a single shift
//
// Arguments that are bare bound/global/literal slots are wrapped in fresh
// single-slot nodes first, so substitution treats every argument as a
// substitution target; wrappers that end the rewrite unreferenced are
// discarded instead of linked.

use crate::runtime::store::{Backref, Ix, Slot, Store, Variety, NIL, NO_BACKREF};
use std::collections::HashMap;

// Prepared argument: a substitution target, and whether it was freshly
// wrapped (not yet linked into any chain).
pub(crate) struct Prepped {
  pub(crate) target: Ix,
  pub(crate) wrapped: bool,
}

struct Walk<'a> {
  supply: &'a [Prepped],
  // Binder level being consumed, in absolute depth.
  b: u32,
  // Formals consumed; `across` below this substitutes, at or above rebases.
  k: usize,
  // Depth shift from body site to splice site.
  delta: i64,
  // True when the binder survives (partial application).
  binder_kept: bool,
}

fn shift_depth(depth: u32, delta: i64, who: &str) -> u32 {
  let shifted = depth as i64 + delta;
  if shifted < 0 {
    panic!("beta::{}: depth underflow ({} by {})", who, depth, delta);
  }
  shifted as u32
}

// Firing
// ------

// Fires `redex` (an App) whose function position resolved to `func`, an
// Abs or Fix node. Returns the chain position to resume scanning from.
pub fn fire_beta(store: &mut Store, redex: Ix, func: Ix) -> Ix {
  let rd = store.node(redex).depth;
  let left_anchor = store.node(redex).prior;
  let variety = store.node(func).variety;
  let fdepth = store.node(func).depth;
  let formals = store.node(func).slots.len() - 1;
  let nargs = store.node(redex).slots.len() - 1;

  // Transient guard: keeps the abstraction alive through the detach and
  // any rename cascade between the redex and it.
  store.node_mut(func).refs += 1;

  // Detach the function slot.
  let func_slot = std::mem::replace(&mut store.node_mut(redex).slots[0], Slot::Spent);
  if let Slot::Sub { node } = func_slot {
    store.release(node, Backref::at(redex, 0));
  }

  // Prepare the supply of substitution targets, one per consumed formal.
  // A fixpoint consumes its self-formal first, wired to the fixpoint node
  // itself.
  let is_fix = variety == Variety::Fix;
  if is_fix && formals == 0 {
    panic!("beta::fire_beta: fixpoint without a self formal");
  }
  let available = nargs + if is_fix { 1 } else { 0 };
  let consumed = available.min(formals);
  let consumed_args = consumed - if is_fix { 1 } else { 0 };
  let remaining = formals - consumed;
  let surplus = nargs - consumed_args;

  let mut supply: Vec<Prepped> = Vec::with_capacity(consumed);
  if is_fix {
    supply.push(Prepped { target: func, wrapped: false });
  }
  for i in 0..consumed_args {
    let slot = store.node(redex).slots[1 + i].clone();
    match slot {
      Slot::Sub { node } => supply.push(Prepped { target: node, wrapped: false }),
      Slot::Bound { .. } | Slot::Global { .. } | Slot::Lit { .. } => {
        let wrapped = store.wrap(slot, rd);
        supply.push(Prepped { target: wrapped, wrapped: true });
      }
      other => panic!("beta::fire_beta: argument slot holds {:?}", other),
    }
  }

  let self_app = is_fix || supply.iter().any(|arg| arg.target == func);
  let destructive = !self_app && store.node(func).refs == 1;

  // Transform the body.
  let bhead = store.node(func).body();
  let delta = if remaining > 0 { rd as i64 - fdepth as i64 } else { rd as i64 - fdepth as i64 - 1 };
  let walk = Walk { supply: &supply, b: fdepth + 1, k: consumed, delta, binder_kept: remaining > 0 };
  let out_head = if destructive {
    destroy_chain(store, &walk, bhead);
    bhead
  } else {
    copy_chain(store, &walk, &mut HashMap::new(), bhead)
  };

  // For a partial application, the remaining formals close over the body
  // again; otherwise the body contents stand on their own.
  let (segment, root) = if remaining > 0 {
    let mut slots: Vec<Slot> = Vec::with_capacity(remaining + 1);
    for i in consumed..formals {
      slots.push(store.node(func).slots[i].clone());
    }
    let abs = store.alloc(Variety::Abs, rd, Vec::new());
    store.add_ref(out_head, Backref::at(abs, slots.len()));
    slots.push(Slot::Sub { node: out_head });
    store.node_mut(abs).slots = slots;
    // The destructive path reused the original body head; the abstraction
    // holds it now, and func's own claim dies with func below.
    (Some((abs, abs)), abs)
  } else {
    consume_chain(store, out_head)
  };

  let (resume, root_ref) = replace_redex(store, redex, segment, root, surplus, left_anchor, supply);

  // Teardown. The copied chain's sentinel is transient; freeing it drops
  // the entry's claim on the root, which the splice re-referenced above.
  if remaining == 0 && !destructive {
    store.free_graph(out_head);
  }
  // Drop the guard. A consumed (destructive) body makes func garbage
  // outright, and its own body slot releases the reused chain head.
  if destructive {
    let refs = store.node(func).refs;
    if refs != 1 {
      panic!("beta::fire_beta: destructive body regrew {} references", refs);
    }
    store.node_mut(func).refs = 0;
    store.free_graph(func);
  } else {
    store.release(func, NO_BACKREF);
  }
  restore_backref(store, root, root_ref);

  store.rewrites += 1;
  resume
}

// Fires a let node: a single-use body applied to its definitions. The body
// is never shared, so this is always the destructive variant one binder
// level down.
pub fn fire_let(store: &mut Store, redex: Ix) -> Ix {
  let rd = store.node(redex).depth;
  let left_anchor = store.node(redex).prior;
  let ndefs = store.node(redex).slots.len() - 1;
  let bhead = store.node(redex).body();
  if store.node(bhead).refs != 1 {
    panic!("beta::fire_let: let body with {} referrers", store.node(bhead).refs);
  }

  let mut supply: Vec<Prepped> = Vec::with_capacity(ndefs);
  for i in 0..ndefs {
    let slot = store.node(redex).slots[i].clone();
    match slot {
      Slot::Sub { node } => supply.push(Prepped { target: node, wrapped: false }),
      Slot::Bound { .. } | Slot::Global { .. } | Slot::Lit { .. } => {
        let wrapped = store.wrap(slot, rd);
        supply.push(Prepped { target: wrapped, wrapped: true });
      }
      other => panic!("beta::fire_let: definition slot holds {:?}", other),
    }
  }

  let walk = Walk { supply: &supply, b: rd + 1, k: ndefs, delta: -1, binder_kept: false };
  destroy_chain(store, &walk, bhead);
  let (segment, root) = consume_chain(store, bhead);

  let (resume, root_ref) = replace_redex(store, redex, segment, root, 0, left_anchor, supply);
  restore_backref(store, root, root_ref);
  store.rewrites += 1;
  resume
}

// The root transiently carries two referrers (the dying chain entry and
// its new slot), which clears its backref; once the entry is gone the new
// slot is unique again.
pub(crate) fn restore_backref(store: &mut Store, root: Ix, root_ref: Backref) {
  if store.is_live(root) {
    let node = store.node_mut(root);
    if node.refs == 1 && node.backref.is_none() {
      node.backref = root_ref;
    }
  }
}

// Splicing
// --------

// Severs a transformed body chain from its sentinel, returning the member
// segment and the root value the chain's entry pointed at (which is
// external when the chain is empty).
pub(crate) fn consume_chain(store: &mut Store, head: Ix) -> (Option<(Ix, Ix)>, Ix) {
  let root = match &store.node(head).slots[0] {
    Slot::Sub { node } => *node,
    other => panic!("beta::consume_chain: chain entry holds {:?}", other),
  };
  let segment = store.sever_chain(head);
  (segment, root)
}

// Wires the reduced value in place of the redex. With a surplus the redex
// survives as an application of the value to the leftover arguments; a
// uniquely-referenced redex is replaced outright through its backref; a
// shared redex collapses into a rename so unknown referrers keep a valid
// target. Returns the resume position and the slot now holding the root.
pub(crate) fn replace_redex(
  store: &mut Store,
  redex: Ix,
  segment: Option<(Ix, Ix)>,
  root: Ix,
  surplus: usize,
  left_anchor: Ix,
  supply: Vec<Prepped>,
) -> (Ix, Backref) {
  let nslots = store.node(redex).slots.len();
  // Slots the redex no longer keeps: everything but the surplus tail.
  let consumed_slots: Vec<usize> =
    (0..nslots - surplus).filter(|i| !matches!(store.node(redex).slots[*i], Slot::Spent)).collect();

  let r_survives;
  let root_ref;
  if surplus > 0 {
    // (f a b c) with f binding a and b leaves (v c).
    let mut slots: Vec<Slot> = vec![Slot::Sub { node: root }];
    for i in nslots - surplus..nslots {
      slots.push(store.node(redex).slots[i].clone());
    }
    // The root is still held by the severed chain's entry; claim it before
    // the released arguments can cascade anywhere near it.
    store.add_ref(root, Backref::at(redex, 0));
    for i in &consumed_slots {
      let old = std::mem::replace(&mut store.node_mut(redex).slots[*i], Slot::Spent);
      if let Slot::Sub { node } = old {
        store.release(node, Backref::at(redex, *i));
      }
    }
    store.node_mut(redex).slots = slots;
    if let Some((first, last)) = segment {
      store.insert_segment_after(redex, first, last);
    }
    r_survives = true;
    root_ref = Backref::at(redex, 0);
  } else {
    let backref = store.node(redex).backref;
    if store.node(redex).refs == 1 && !backref.is_none() {
      if let Some((first, last)) = segment {
        store.insert_segment_after(redex, first, last);
      }
      store.add_ref(root, backref);
      store.node_mut(backref.node).slots[backref.slot as usize] = Slot::Sub { node: root };
      store.node_mut(redex).refs = 0;
      store.node_mut(redex).backref = NO_BACKREF;
      store.free_graph(redex);
      r_survives = false;
      root_ref = backref;
    } else {
      // Referrers unknown: the redex node itself becomes a rename.
      store.add_ref(root, Backref::at(redex, 0));
      for i in &consumed_slots {
        let old = std::mem::replace(&mut store.node_mut(redex).slots[*i], Slot::Spent);
        if let Slot::Sub { node } = old {
          store.release(node, Backref::at(redex, *i));
        }
      }
      let node = store.node_mut(redex);
      node.variety = Variety::Var;
      node.slots = vec![Slot::Sub { node: root }];
      if let Some((first, last)) = segment {
        store.insert_segment_after(redex, first, last);
      }
      r_survives = true;
      root_ref = Backref::at(redex, 0);
    }
  }

  // Link used wrappers to the right of the new material; discard the rest.
  let mut rightmost = match segment {
    Some((_, last)) => last,
    None => {
      if r_survives {
        redex
      } else {
        NIL
      }
    }
  };
  for arg in supply {
    if arg.wrapped {
      if store.node(arg.target).refs > 0 {
        let pos = if rightmost != NIL { rightmost } else { left_anchor };
        store.insert_after(pos, arg.target);
        rightmost = arg.target;
      } else {
        store.free_graph(arg.target);
      }
    }
  }

  let resume = if rightmost != NIL { rightmost } else { left_anchor };
  (resume, root_ref)
}

// Copying walk
// ------------

// Copies one chain, right to left so every same-chain substitution target
// is forwarded before its referrer is reached. Nested bodies recurse.
fn copy_chain(store: &mut Store, walk: &Walk, fwd: &mut HashMap<Ix, Ix>, head: Ix) -> Ix {
  let new_depth = shift_depth(store.node(head).depth, walk.delta, "copy_chain");
  let new_head = store.new_chain(new_depth);
  let mut at = store.node(head).prior;
  while at != head {
    let copy = copy_node(store, walk, fwd, at);
    fwd.insert(at, copy);
    store.insert_after(new_head, copy);
    at = store.node(at).prior;
  }
  let entry = match &store.node(head).slots[0] {
    Slot::Sub { node } => *node,
    other => panic!("beta::copy_chain: chain entry holds {:?}", other),
  };
  let target = *fwd.get(&entry).unwrap_or(&entry);
  store.add_ref(target, Backref::at(new_head, 0));
  store.node_mut(new_head).slots[0] = Slot::Sub { node: target };
  new_head
}

fn copy_node(store: &mut Store, walk: &Walk, fwd: &mut HashMap<Ix, Ix>, at: Ix) -> Ix {
  let depth = store.node(at).depth;
  let variety = store.node(at).variety;
  let copy = store.alloc(variety, shift_depth(depth, walk.delta, "copy_node"), Vec::new());
  let nslots = store.node(at).slots.len();
  let mut slots: Vec<Slot> = Vec::with_capacity(nslots);
  for i in 0..nslots {
    let slot = store.node(at).slots[i].clone();
    let new_slot = match slot {
      Slot::Bound { up, across } => rewrite_bound(store, walk, copy, i, depth, up, across),
      Slot::Sub { node } => {
        if store.node(node).variety == Variety::Head {
          let inner = copy_chain(store, walk, fwd, node);
          store.add_ref(inner, Backref::at(copy, i));
          Slot::Sub { node: inner }
        } else if let Some(&forwarded) = fwd.get(&node) {
          // Forwarded target: the copy keeps the body's internal sharing,
          // and the count goes up exactly as for a first-time target.
          store.add_ref(forwarded, Backref::at(copy, i));
          Slot::Sub { node: forwarded }
        } else {
          // External target: shared between original and copy.
          store.add_ref(node, Backref::at(copy, i));
          Slot::Sub { node }
        }
      }
      other => other,
    };
    slots.push(new_slot);
  }
  store.node_mut(copy).slots = slots;
  copy
}

// Shared index arithmetic for both walks. `owner`/`idx` locate the slot
// being written, for the backref of a substituted occurrence.
fn rewrite_bound(
  store: &mut Store,
  walk: &Walk,
  owner: Ix,
  idx: usize,
  depth: u32,
  up: u32,
  across: u32,
) -> Slot {
  if up > depth {
    panic!("beta::rewrite_bound: variable climbs {} from depth {}", up, depth);
  }
  let rel = depth - up;
  if rel > walk.b {
    Slot::Bound { up, across }
  } else if rel == walk.b {
    if (across as usize) < walk.k {
      let target = walk.supply[across as usize].target;
      store.add_ref(target, Backref::at(owner, idx));
      Slot::Sub { node: target }
    } else if walk.binder_kept {
      Slot::Bound { up, across: across - walk.k as u32 }
    } else {
      panic!("beta::rewrite_bound: across {} outside {} consumed formals", across, walk.k);
    }
  } else {
    let shifted = up as i64 + walk.delta;
    if shifted < 0 {
      panic!("beta::rewrite_bound: binder level {} escapes the splice site", rel);
    }
    Slot::Bound { up: shifted as u32, across }
  }
}

// Destructive walk
// ----------------

// Mutates an unshared body in place: same arithmetic, no allocation.
// Depths are rewritten as it walks; nested bodies recurse.
fn destroy_chain(store: &mut Store, walk: &Walk, head: Ix) {
  let new_depth = shift_depth(store.node(head).depth, walk.delta, "destroy_chain");
  {
    let node = store.node_mut(head);
    node.depth = new_depth;
    // Substitution can plant new redexes in a body the sweep already saw.
    node.visited = false;
  }
  let mut members: Vec<Ix> = Vec::new();
  let mut at = store.node(head).next;
  while at != head {
    members.push(at);
    at = store.node(at).next;
  }
  for m in members {
    let depth = store.node(m).depth;
    let nslots = store.node(m).slots.len();
    for i in 0..nslots {
      let slot = store.node(m).slots[i].clone();
      match slot {
        Slot::Bound { up, across } => {
          let new_slot = rewrite_bound(store, walk, m, i, depth, up, across);
          store.node_mut(m).slots[i] = new_slot;
        }
        Slot::Sub { node } => {
          if store.node(node).variety == Variety::Head {
            destroy_chain(store, walk, node);
          }
        }
        _ => {}
      }
    }
    store.node_mut(m).depth = shift_depth(depth, walk.delta, "destroy_chain");
  }
}
