use proptest::prelude::*;
use switchyard::{Tree, Value};

#[derive(Debug, Clone)]
enum Op {
    Graft(String, Option<Value>),
    Prune(String),
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-8000i32..8000).prop_map(|n| Value::Double(n as f64 / 8.0)),
        "[ -~]{0,12}".prop_map(Value::Str),
        "[a-z\\n\"\\\\,]{0,6}".prop_map(Value::Str),
    ]
}

fn path() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9_ \t\\\\-]{0,4}", 1..4).prop_map(|segs| format!(".{}", segs.join(".")))
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (path(), prop::option::of(value())).prop_map(|(p, v)| Op::Graft(p, v)),
        1 => path().prop_map(Op::Prune),
    ]
}

fn build(ops: &[Op]) -> Tree {
    let mut tree = Tree::new();
    for op in ops {
        match op {
            Op::Graft(path, Some(value)) => tree.vgraft(path, value.clone()),
            Op::Graft(path, None) => tree.graft(path, Tree::new()),
            Op::Prune(path) => {
                tree.prune(path);
            }
        }
    }
    tree
}

proptest! {
    #[test]
    fn json_round_trip(ops in prop::collection::vec(op(), 0..24)) {
        let tree = build(&ops);
        let back = Tree::from_json(&tree.to_json()).unwrap();
        prop_assert_eq!(back, tree);
    }

    #[test]
    fn keyval_round_trip(ops in prop::collection::vec(op(), 0..24)) {
        let tree = build(&ops);
        let back = Tree::from_keyval(&tree.to_keyval()).unwrap();
        prop_assert_eq!(back, tree);
    }

    #[test]
    fn graft_then_read(path in path(), value in value()) {
        let mut tree = Tree::new();
        tree.vgraft(&path, value.clone());
        prop_assert_eq!(tree.value_at(&path), Some(&value));
        prop_assert!(tree.prune(&path).is_some());
        prop_assert!(!tree.exists(&path));
    }
}
