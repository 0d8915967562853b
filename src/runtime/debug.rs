// Debug
// -----
//
// Structural rendering of nodes and chains (location token, variety,
// depth, count, slots), and the invariant audit the sanity feature and
// the test suite run over whole graphs.

use crate::runtime::store::{Backref, Ix, Literal, Slot, Store, Variety};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};

// A short stable token for a node, in place of a raw address.
pub fn loc_token(ix: Ix) -> String {
  format!("n{:04x}", ix)
}

fn show_lit(val: &Literal) -> String {
  match val {
    Literal::Num(n) => format!("{}", n),
    Literal::Str(s) => format!("{:?}", s),
    Literal::Sym(s) => format!("#{}", s),
    Literal::Opr(o) => format!("{}", o),
  }
}

pub fn show_slot(slot: &Slot) -> String {
  match slot {
    Slot::Bound { up, across } => format!("^{}.{}", up, across),
    Slot::Global { index } => format!("${}", index),
    Slot::Sub { node } => format!("->{}", loc_token(*node)),
    Slot::Lit { val } => show_lit(val),
    Slot::Param { name } => format!("\\{}", name),
    Slot::Spent => String::from("~"),
  }
}

pub fn show_node(store: &Store, ix: Ix) -> String {
  let node = store.node(ix);
  let slots = node.slots.iter().map(show_slot).join(" ");
  format!(
    "{} {} d{} r{} [{}]",
    loc_token(ix),
    node.variety.as_str(),
    node.depth,
    node.refs,
    slots
  )
}

// Renders one chain, sentinel first, members left to right.
pub fn show_chain(store: &Store, head: Ix) -> String {
  let mut text = show_node(store, head);
  let mut at = store.node(head).next;
  while at != head {
    text.push_str("\n  ");
    text.push_str(&show_node(store, at));
    at = store.node(at).next;
  }
  text
}

// Audit
// -----

// Every node reachable from the roots, via chain circles and substitution
// slots both. Deferred garbage still sits in chains and still owns its
// outgoing references, so it is included.
fn reachable(store: &Store, roots: &[Ix]) -> Vec<Ix> {
  let mut seen: HashSet<Ix> = HashSet::new();
  let mut order: Vec<Ix> = Vec::new();
  let mut work: Vec<Ix> = roots.to_vec();
  while let Some(at) = work.pop() {
    if !store.is_live(at) || !seen.insert(at) {
      continue;
    }
    order.push(at);
    let node = store.node(at);
    if node.variety == Variety::Head {
      let mut m = node.next;
      while m != at {
        work.push(m);
        m = store.node(m).next;
      }
    }
    for slot in &node.slots {
      if let Slot::Sub { node: target } = slot {
        work.push(*target);
      }
    }
  }
  order
}

// Structural audit: recomputed reference counts, backref validity, depth
// relations, chain sanity, the adjacent-rename condition. Does not demand
// the absence of pending garbage; `gc_clean` does.
pub fn audit(store: &Store, roots: &[Ix]) -> Result<(), String> {
  let nodes = reachable(store, roots);
  let node_set: HashSet<Ix> = nodes.iter().copied().collect();

  // Nodes whose owning chain was walked: their referrers are all in view,
  // so their counts must match exactly. A node reached only through a
  // substitution (a shared value whose owner's chain is outside the
  // audited roots) may carry referrers we cannot see.
  let mut chained: HashSet<Ix> = HashSet::new();
  for &ix in &nodes {
    let node = store.node(ix);
    if node.variety == Variety::Head {
      chained.insert(ix);
      let mut m = node.next;
      while m != ix {
        chained.insert(m);
        m = store.node(m).next;
      }
    }
  }

  // Recount every substitution edge.
  let mut counted: HashMap<Ix, u32> = HashMap::new();
  for &ix in &nodes {
    for slot in &store.node(ix).slots {
      if let Slot::Sub { node: target } = slot {
        if !store.is_live(*target) {
          return Err(format!("{} holds a substitution to freed {}", loc_token(ix), loc_token(*target)));
        }
        *counted.entry(*target).or_insert(0) += 1;
      }
    }
  }
  for &ix in &nodes {
    let node = store.node(ix);
    let expect = counted.get(&ix).copied().unwrap_or(0);
    let exact = chained.contains(&ix);
    if (exact && node.refs != expect) || node.refs < expect {
      return Err(format!(
        "{} counts {} references but {} substitutions reach it",
        loc_token(ix),
        node.refs,
        expect
      ));
    }
    let backref = node.backref;
    if !backref.is_none() {
      if !store.is_live(backref.node) {
        return Err(format!("{} backref names freed {}", loc_token(ix), loc_token(backref.node)));
      }
      let holder = store.node(backref.node);
      match holder.slots.get(backref.slot as usize) {
        Some(Slot::Sub { node: target }) if *target == ix => {}
        _ => {
          return Err(format!(
            "{} backref names {} slot {} which does not point back",
            loc_token(ix),
            loc_token(backref.node),
            backref.slot
          ));
        }
      }
    }
  }

  // Chain and depth relations.
  for &ix in &nodes {
    let node = store.node(ix);
    if node.variety == Variety::Head {
      let mut m = node.next;
      let mut prev = ix;
      while m != ix {
        let member = store.node(m);
        if member.prior != prev {
          return Err(format!("{} chain link broken at {}", loc_token(ix), loc_token(m)));
        }
        if member.variety == Variety::Head {
          return Err(format!("{} contains a sentinel {}", loc_token(ix), loc_token(m)));
        }
        if member.depth != node.depth {
          return Err(format!(
            "{} at depth {} sits in a depth-{} chain",
            loc_token(m),
            member.depth,
            node.depth
          ));
        }
        prev = m;
        m = member.next;
      }
      match &node.slots[..] {
        [Slot::Sub { node: entry }] => {
          if !node_set.contains(entry) {
            return Err(format!("{} entry escapes the audited graph", loc_token(ix)));
          }
        }
        [Slot::Spent] => {}
        _ => return Err(format!("{} sentinel owns {} slots", loc_token(ix), node.slots.len())),
      }
    }
    if node.variety.has_body() {
      let bhead = store.node(ix).body();
      let expect = node.depth + 1;
      if store.node(bhead).depth != expect {
        return Err(format!(
          "{} body sentinel at depth {} under a depth-{} binder",
          loc_token(bhead),
          store.node(bhead).depth,
          node.depth
        ));
      }
    }
    if node.variety == Variety::Tst {
      for slot in &node.slots[1..] {
        if let Slot::Sub { node: branch } = slot {
          if store.node(*branch).variety == Variety::Head && store.node(*branch).depth != node.depth {
            return Err(format!(
              "{} branch sentinel depth {} under a depth-{} test",
              loc_token(*branch),
              store.node(*branch).depth,
              node.depth
            ));
          }
        }
      }
    }
  }

  // No unresolved rename directly feeding an eliminable one.
  for &ix in &nodes {
    let node = store.node(ix);
    if node.variety != Variety::Var {
      continue;
    }
    if let [Slot::Sub { node: target }] = node.slots[..] {
      if node.next == target && store.node(target).variety == Variety::Var {
        let t = store.node(target);
        if matches!(t.slots[..], [Slot::Sub { .. }]) && t.refs == 1 && !t.backref.is_none() {
          return Err(format!(
            "adjacent renames {} -> {} survived a scan",
            loc_token(ix),
            loc_token(target)
          ));
        }
      }
    }
  }

  Ok(())
}

// Post-reduction check: nothing reachable is garbage.
pub fn gc_clean(store: &Store, roots: &[Ix]) -> Result<(), String> {
  for ix in reachable(store, roots) {
    let node = store.node(ix);
    if node.refs == 0 && node.variety != Variety::Head && !roots.contains(&ix) {
      return Err(format!("{} is reachable with zero references", loc_token(ix)));
    }
  }
  Ok(())
}

// Recomputes one node's referrers, for tests that want to pinpoint a slot.
pub fn referrers_of(store: &Store, roots: &[Ix], target: Ix) -> Vec<Backref> {
  let mut found = Vec::new();
  for ix in reachable(store, roots) {
    for (i, slot) in store.node(ix).slots.iter().enumerate() {
      if slot.target() == Some(target) {
        found.push(Backref::at(ix, i));
      }
    }
  }
  found
}
