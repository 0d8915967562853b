// Scenario tests: whole pipeline runs over literal programs, with the
// graph audited where the interesting part is what reduction left behind.

use lamina::api::Session;
use lamina::language::resolve::Env;
use lamina::language::syntax::{as_numeral, Term};
use lamina::runtime::reduce::Mode;
use lamina::runtime::store::Store;
use lamina::runtime::{audit, flatten, gc_clean, reduce, unflatten};
use lamina::read_term;

const SIZE: usize = 1 << 16;

fn session() -> Session {
  Session::new(SIZE, Mode::Deep, false)
}

// Builds a graph from source against an environment, without reducing.
fn graph_of(store: &mut Store, env: &Env, src: &str) -> u32 {
  let term = read_term(src).unwrap();
  let code = env.resolve(&term).unwrap();
  flatten(store, env, &code)
}

fn all_roots(env: &Env, head: u32) -> Vec<u32> {
  let mut roots = env.roots();
  roots.push(head);
  roots
}

#[test]
fn identity_roundtrips_without_reduction() {
  let mut store = Store::new(SIZE);
  let env = Env::new();
  let head = graph_of(&mut store, &env, "[x. x]");
  let term = unflatten(&store, &env, head);
  match &term {
    Term::Lam { pars, body } => {
      assert_eq!(pars, &vec!["x".to_string()]);
      assert_eq!(**body, Term::Var { name: "x".to_string() });
    }
    other => panic!("read back {:?}", other),
  }
  assert_eq!(format!("{}", term), "[x. x]");
  audit(&store, &[head]).unwrap();
}

#[test]
fn identity_applied_to_a_global_yields_the_global() {
  let mut store = Store::new(SIZE);
  let mut env = Env::new();
  env.define_opaque("y");
  let head = graph_of(&mut store, &env, "([x. x] y)");
  let steps = reduce(&mut store, head, Mode::Deep, false, 0);
  assert_eq!(steps, 1);
  audit(&store, &all_roots(&env, head)).unwrap();
  gc_clean(&store, &all_roots(&env, head)).unwrap();
  assert_eq!(format!("{}", unflatten(&store, &env, head)), "y");
}

#[test]
fn church_addition_of_two_and_three_is_five() {
  let mut session = session();
  session.define("TWO", "[f x. (f (f x))]").unwrap();
  session.define("THREE", "[f x. (f (f (f x)))]").unwrap();
  session.define("ADD", "[m n f x. ((m f) ((n f) x))]").unwrap();
  let (term, steps, _) = session.eval_term("(ADD TWO THREE)").unwrap();
  assert!(steps > 0);
  assert_eq!(as_numeral(&term), Some(5));
}

#[test]
fn conditional_selects_consequent_and_collects_the_other_branch() {
  let mut store = Store::new(SIZE);
  let env = Env::new();
  let head = graph_of(&mut store, &env, "[(0 == 0) ? 1 | 2]");
  let steps = reduce(&mut store, head, Mode::Deep, false, 0);
  assert_eq!(steps, 2);
  audit(&store, &[head]).unwrap();
  gc_clean(&store, &[head]).unwrap();
  assert_eq!(format!("{}", unflatten(&store, &env, head)), "1");
  // Sentinel plus the surviving value: the rejected branch's chain is
  // gone, not merely unreachable.
  assert_eq!(store.live(), 2);
}

#[test]
fn conditional_with_false_predicate_selects_the_alternative() {
  let mut session = session();
  let (out, _, _) = session.eval("[(1 == 0) ? 1 | 2]").unwrap();
  assert_eq!(out, "2");
}

#[test]
fn arithmetic_reduces_through_applications() {
  let mut session = session();
  let (out, _, _) = session.eval("([x y. ((x * y) + 1)] 6 7)").unwrap();
  assert_eq!(out, "43");
}

#[test]
fn let_bindings_substitute_and_die() {
  let mut store = Store::new(SIZE);
  let env = Env::new();
  let head = graph_of(&mut store, &env, "{a = 1, b = [x. x]. (b a)}");
  reduce(&mut store, head, Mode::Deep, false, 0);
  audit(&store, &[head]).unwrap();
  gc_clean(&store, &[head]).unwrap();
  assert_eq!(format!("{}", unflatten(&store, &env, head)), "1");
}

#[test]
fn fixpoint_counts_down_to_zero() {
  let mut session = session();
  let (out, _, _) = session.eval("([@go n. [(n == 0) ? 0 | (go (n - 1))]] 3)").unwrap();
  assert_eq!(out, "0");
}

#[test]
fn self_application_diverges_cleanly_under_fuel() {
  let mut store = Store::new(SIZE);
  let env = Env::new();
  let head = graph_of(&mut store, &env, "([x. (x x)] [x. (x x)])");
  let steps = reduce(&mut store, head, Mode::Deep, false, 500);
  assert_eq!(steps, 500);
  audit(&store, &[head]).unwrap();
  // Still consistent after another bounded run.
  reduce(&mut store, head, Mode::Deep, false, 500);
  audit(&store, &[head]).unwrap();
}

#[test]
fn normal_forms_reduce_idempotently() {
  let mut store = Store::new(SIZE);
  let mut env = Env::new();
  env.define_opaque("y");
  let head = graph_of(&mut store, &env, "([x. ([z. z] x)] y)");
  let first = reduce(&mut store, head, Mode::Deep, false, 0);
  assert!(first > 0);
  let second = reduce(&mut store, head, Mode::Deep, false, 0);
  assert_eq!(second, 0);
}

#[test]
fn surface_mode_leaves_unapplied_bodies_alone() {
  let mut store = Store::new(SIZE);
  let env = Env::new();

  let head = graph_of(&mut store, &env, "[y. ([x. x] y)]");
  let steps = reduce(&mut store, head, Mode::Surface, false, 0);
  assert_eq!(steps, 0);
  assert_eq!(format!("{}", unflatten(&store, &env, head)), "[y. ([x. x] y)]");

  let head = graph_of(&mut store, &env, "[y. ([x. x] y)]");
  reduce(&mut store, head, Mode::Deep, false, 0);
  assert_eq!(format!("{}", unflatten(&store, &env, head)), "[y. y]");
}

// The copying walk can reach a body node whose copy already exists in the
// forwarding table (internal sharing planted by an earlier substitution).
// The extra count taken there must neither leak nor free early.
#[test]
fn copying_a_body_with_internal_sharing_is_sound() {
  let mut store = Store::new(SIZE);
  let env = Env::new();
  let head =
    graph_of(&mut store, &env, "([p. <(p 1), (p 2)>] ([f. [x. (f (f x))]] [w. w]))");
  let steps = reduce(&mut store, head, Mode::Deep, false, 0);
  assert!(steps > 0);
  audit(&store, &[head]).unwrap();
  gc_clean(&store, &[head]).unwrap();
  assert_eq!(format!("{}", unflatten(&store, &env, head)), "<1, 2>");
}

#[test]
fn cells_are_inert_and_readable() {
  let mut session = session();
  let (out, _, _) = session.eval("<(1 + 1), #ok, \"s\">").unwrap();
  assert_eq!(out, "<2, #ok, \"s\">");
}

#[test]
fn shared_globals_survive_their_uses() {
  let mut store = Store::new(SIZE);
  let mut env = Env::new();
  let two = read_term("[f x. (f (f x))]").unwrap();
  env.define(&mut store, "TWO", &two, lamina::GlobalFlags::transparent()).unwrap();
  // Two independent uses of the shared definition graph.
  let head = graph_of(&mut store, &env, "<(TWO [w. w] 5), (TWO [w. w] 9)>");
  reduce(&mut store, head, Mode::Deep, false, 0);
  audit(&store, &all_roots(&env, head)).unwrap();
  gc_clean(&store, &all_roots(&env, head)).unwrap();
  assert_eq!(format!("{}", unflatten(&store, &env, head)), "<5, 9>");
  // The definition graph is intact for a third use.
  let head2 = graph_of(&mut store, &env, "(TWO [w. w] 7)");
  reduce(&mut store, head2, Mode::Deep, false, 0);
  assert_eq!(format!("{}", unflatten(&store, &env, head2)), "7");
}

fn contains_pruned(term: &Term) -> bool {
  match term {
    Term::Pruned => true,
    Term::Lam { body, .. } | Term::Fix { body, .. } => contains_pruned(body),
    Term::App { func, args } => {
      contains_pruned(func) || args.iter().any(|a| contains_pruned(a))
    }
    Term::Let { defs, body } => {
      defs.iter().any(|(_, d)| contains_pruned(d)) || contains_pruned(body)
    }
    Term::Tst { pred, then, other } => {
      contains_pruned(pred) || contains_pruned(then) || contains_pruned(other)
    }
    Term::Cel { items } => items.iter().any(|i| contains_pruned(i)),
    _ => false,
  }
}

// Exponential unsharing is cut off by the readback budget, not fatal.
#[test]
fn readback_prunes_exponential_unsharing() {
  let mut src = String::from("{x0 = <1, 1>. ");
  let levels = 24;
  for i in 1..levels {
    src.push_str(&format!("{{x{} = <x{}, x{}>. ", i, i - 1, i - 1));
  }
  src.push_str(&format!("x{}", levels - 1));
  for _ in 0..levels {
    src.push('}');
  }

  let mut session = session();
  let (term, _, _) = session.eval_term(&src).unwrap();
  assert!(contains_pruned(&term));

  // The same shape three levels deep reads back whole.
  let (small, _, _) =
    session.eval_term("{a = <1, 1>. {b = <a, a>. {c = <b, b>. c}}}").unwrap();
  assert!(!contains_pruned(&small));
  assert_eq!(format!("{}", small), "<<<1, 1>, <1, 1>>, <<1, 1>, <1, 1>>>");
}

#[test]
#[should_panic(expected = "node store exhausted")]
fn heap_exhaustion_is_fatal() {
  let mut store = Store::new(8);
  let env = Env::new();
  graph_of(&mut store, &env, "([a b. (a b)] [x. x] [y. (y y)])");
}

#[test]
fn surplus_arguments_reapply_the_result() {
  let mut session = session();
  // [k. k] takes one argument; the second lands on the identity it returns.
  let (out, _, _) = session.eval("([k. k] [x. x] 9)").unwrap();
  assert_eq!(out, "9");
}

#[test]
fn partial_application_rebinds_the_tail() {
  let mut session = session();
  let (out, _, _) = session.eval("(([a b. (a + b)] 40) 2)").unwrap();
  assert_eq!(out, "42");
}
