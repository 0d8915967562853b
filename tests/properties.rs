// Property tests: random closed terms go through flatten / reduce /
// readback while the graph auditor recounts every reference.

use lamina::language::resolve::Env;
use lamina::language::syntax::Term;
use lamina::runtime::reduce::Mode;
use lamina::runtime::store::Store;
use lamina::runtime::{audit, flatten, gc_clean, reduce, unflatten};
use proptest::prelude::*;

const SIZE: usize = 1 << 16;
const FUEL: u64 = 2_000;

// Closed-term generator: variables only ever name binders in scope.
fn arb_term(depth: u32, scope: Vec<String>) -> BoxedStrategy<Term> {
  let mut leaves: Vec<BoxedStrategy<Term>> = vec![
    (0i64..100).prop_map(|numb| Term::Num { numb }).boxed(),
    Just(Term::Sym { name: "tag".to_string() }).boxed(),
  ];
  if !scope.is_empty() {
    let names = scope.clone();
    leaves.push(
      (0..names.len()).prop_map(move |i| Term::Var { name: names[i].clone() }).boxed(),
    );
  }
  let leaf = proptest::strategy::Union::new(leaves);
  if depth == 0 {
    return leaf.boxed();
  }

  let lam = {
    let mut inner = scope.clone();
    let par = format!("v{}", depth);
    inner.push(par.clone());
    arb_term(depth - 1, inner)
      .prop_map(move |body| Term::Lam { pars: vec![par.clone()], body: Box::new(body) })
  };
  let lam2 = {
    let mut inner = scope.clone();
    let p0 = format!("a{}", depth);
    let p1 = format!("b{}", depth);
    inner.push(p0.clone());
    inner.push(p1.clone());
    arb_term(depth - 1, inner).prop_map(move |body| Term::Lam {
      pars: vec![p0.clone(), p1.clone()],
      body: Box::new(body),
    })
  };
  let app = (arb_term(depth - 1, scope.clone()), arb_term(depth - 1, scope.clone()))
    .prop_map(|(func, arg)| Term::App { func: Box::new(func), args: vec![Box::new(arg)] });
  let bind = {
    let mut inner = scope.clone();
    let name = format!("l{}", depth);
    inner.push(name.clone());
    (arb_term(depth - 1, scope.clone()), arb_term(depth - 1, inner)).prop_map(
      move |(def, body)| Term::Let {
        defs: vec![(name.clone(), Box::new(def))],
        body: Box::new(body),
      },
    )
  };
  let test = (
    (0i64..3),
    (0i64..3),
    arb_term(depth - 1, scope.clone()),
    arb_term(depth - 1, scope.clone()),
  )
    .prop_map(|(a, b, then, other)| Term::Tst {
      pred: Box::new(Term::App {
        func: Box::new(Term::Opr { oper: lamina::Oper::Eql }),
        args: vec![Box::new(Term::Num { numb: a }), Box::new(Term::Num { numb: b })],
      }),
      then: Box::new(then),
      other: Box::new(other),
    });
  let cell = (arb_term(depth - 1, scope.clone()), arb_term(depth - 1, scope))
    .prop_map(|(a, b)| Term::Cel { items: vec![Box::new(a), Box::new(b)] });

  prop_oneof![
    4 => leaf,
    3 => lam,
    1 => lam2,
    3 => app,
    2 => bind,
    1 => test,
    1 => cell,
  ]
  .boxed()
}

// Alpha-normalization: binders renamed in traversal order, so terms that
// differ only in names (let readback gensyms) compare equal.
fn canon(term: &Term) -> Term {
  fn go(term: &Term, scope: &mut Vec<(String, String)>, counter: &mut usize) -> Term {
    let fresh = |n: usize| format!("k{}", n);
    match term {
      Term::Var { name } => {
        let renamed = scope
          .iter()
          .rev()
          .find(|(old, _)| old == name)
          .map(|(_, new)| new.clone())
          .unwrap_or_else(|| name.clone());
        Term::Var { name: renamed }
      }
      Term::Lam { pars, body } | Term::Fix { pars, body } => {
        let news: Vec<String> = pars
          .iter()
          .map(|old| {
            let new = fresh(*counter);
            *counter += 1;
            scope.push((old.clone(), new.clone()));
            new
          })
          .collect();
        let body = Box::new(go(body, scope, counter));
        scope.truncate(scope.len() - pars.len());
        match term {
          Term::Lam { .. } => Term::Lam { pars: news, body },
          _ => Term::Fix { pars: news, body },
        }
      }
      Term::App { func, args } => Term::App {
        func: Box::new(go(func, scope, counter)),
        args: args.iter().map(|a| Box::new(go(a, scope, counter))).collect(),
      },
      Term::Let { defs, body } => {
        let vals: Vec<Term> = defs.iter().map(|(_, d)| go(d, scope, counter)).collect();
        let news: Vec<String> = defs
          .iter()
          .map(|(old, _)| {
            let new = fresh(*counter);
            *counter += 1;
            scope.push((old.clone(), new.clone()));
            new
          })
          .collect();
        let body = Box::new(go(body, scope, counter));
        scope.truncate(scope.len() - defs.len());
        Term::Let {
          defs: news.into_iter().zip(vals.into_iter().map(Box::new)).collect(),
          body,
        }
      }
      Term::Tst { pred, then, other } => Term::Tst {
        pred: Box::new(go(pred, scope, counter)),
        then: Box::new(go(then, scope, counter)),
        other: Box::new(go(other, scope, counter)),
      },
      Term::Cel { items } => Term::Cel {
        items: items.iter().map(|i| Box::new(go(i, scope, counter))).collect(),
      },
      other => other.clone(),
    }
  }
  go(term, &mut Vec::new(), &mut 0)
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  // unflatten(flatten(t)) is alpha-equivalent to t for every closed t.
  #[test]
  fn flatten_unflatten_roundtrip(term in arb_term(3, Vec::new())) {
    let mut store = Store::new(SIZE);
    let env = Env::new();
    let code = env.resolve(&term).unwrap();
    let head = flatten(&mut store, &env, &code);
    audit(&store, &[head]).unwrap();
    let back = unflatten(&store, &env, head);
    prop_assert_eq!(canon(&term), canon(&back));
  }

  // Counts, backrefs and depths hold after any bounded reduction.
  #[test]
  fn reduction_preserves_graph_invariants(term in arb_term(3, Vec::new())) {
    let mut store = Store::new(SIZE);
    let env = Env::new();
    let code = env.resolve(&term).unwrap();
    let head = flatten(&mut store, &env, &code);
    let steps = reduce(&mut store, head, Mode::Deep, false, FUEL);
    audit(&store, &[head]).unwrap();
    if steps < FUEL {
      // Completed: nothing reachable may be garbage, and re-reducing
      // fires no rule.
      gc_clean(&store, &[head]).unwrap();
      let again = reduce(&mut store, head, Mode::Deep, false, FUEL);
      prop_assert_eq!(again, 0);
    }
  }

  // Surface reduction respects the same invariants.
  #[test]
  fn surface_reduction_preserves_graph_invariants(term in arb_term(3, Vec::new())) {
    let mut store = Store::new(SIZE);
    let env = Env::new();
    let code = env.resolve(&term).unwrap();
    let head = flatten(&mut store, &env, &code);
    let steps = reduce(&mut store, head, Mode::Surface, false, FUEL);
    audit(&store, &[head]).unwrap();
    if steps < FUEL {
      gc_clean(&store, &[head]).unwrap();
    }
  }

  // Readback stays total (possibly pruned) whatever reduction left.
  #[test]
  fn readback_is_total(term in arb_term(3, Vec::new())) {
    let mut store = Store::new(SIZE);
    let env = Env::new();
    let code = env.resolve(&term).unwrap();
    let head = flatten(&mut store, &env, &code);
    reduce(&mut store, head, Mode::Deep, false, FUEL);
    let back = unflatten(&store, &env, head);
    let _ = format!("{}", back);
  }
}

// Applying a shared abstraction whose body carries internal sharing
// exercises the forwarded-copy increment; shapes with double use of the
// argument make the sharing dense.
proptest! {
  #![proptest_config(ProptestConfig::with_cases(32))]

  #[test]
  fn shared_body_copies_never_free_early(n in 1i64..50) {
    let src = format!(
      "([p. <(p {}), (p {})>] ([f. [x. (f (f x))]] [w. w]))",
      n, n + 1
    );
    let term = lamina::read_term(&src).unwrap();
    let mut store = Store::new(SIZE);
    let env = Env::new();
    let code = env.resolve(&term).unwrap();
    let head = flatten(&mut store, &env, &code);
    let steps = reduce(&mut store, head, Mode::Deep, false, FUEL);
    prop_assert!(steps < FUEL);
    audit(&store, &[head]).unwrap();
    gc_clean(&store, &[head]).unwrap();
    let back = unflatten(&store, &env, head);
    prop_assert_eq!(format!("{}", back), format!("<{}, {}>", n, n + 1));
  }
}
