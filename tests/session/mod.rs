// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::common::*;

use std::sync::Arc;

use anyhow::Result;
use liveexpr::*;
use parking_lot::Mutex;

#[test]
fn property_change_recomputes_sum() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let p = pair(2, 3);

    let sum = Expr::binary(BinaryOp::Add, int_prop(&p, "a"), int_prop(&p, "b"));
    let root = session.create(&sum, &options)?;
    assert_eq!(value_of(&session, root), Some(Value::from(5i64)));
    assert_eq!(session.node_count(), 4);

    p.set("b", 10);
    assert_eq!(value_of(&session, root), Some(Value::from(12i64)));

    // unrelated properties do not reach the graph
    let changes = Counter::default();
    let c = changes.clone();
    let _s = session.subscribe(root, move |_| c.hit());
    p.set("c", 1);
    assert_eq!(changes.get(), 0);

    p.touch_all();
    assert_eq!(changes.get(), 0);

    assert!(session.release(root)?);
    assert_eq!(session.node_count(), 0);
    assert_eq!(p.subscriber_count(), 0);
    Ok(())
}

#[test]
fn structurally_equal_trees_share_a_node() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let p = pair(1, 2);

    let build = || Expr::binary(BinaryOp::Mul, int_prop(&p, "a"), Expr::literal(3i64));
    let first = session.create(&build(), &options)?;
    let second = session.create(&build(), &options)?;
    assert_eq!(first, second);
    assert_eq!(session.refcount(first), 2);
    assert_eq!(session.node_count(), 4);

    assert!(!session.release(first)?);
    assert_eq!(value_of(&session, first), Some(Value::from(3i64)));
    assert!(session.release(second)?);
    assert_eq!(session.refcount(first), 0);
    assert_eq!(session.node_count(), 0);
    Ok(())
}

#[test]
fn released_handles_are_stale() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();

    let id = session.create(&Expr::literal("x"), &options)?;
    session.release(id)?;
    assert!(session.outcome(id).is_none());
    assert!(matches!(session.release(id), Err(Error::UnknownNode(n)) if n == id));

    // the recycled slot gets a new generation
    let again = session.create(&Expr::literal("x"), &options)?;
    assert_ne!(again, id);
    assert!(session.outcome(id).is_none());
    session.release(again)?;
    Ok(())
}

#[test]
fn diamond_updates_root_once() -> Result<()> {
    let fixture = Calc::new()?;
    let session = fixture.session();
    let options = Options::new().shared();
    let p = pair(1, 0);

    let left = Expr::binary(BinaryOp::Add, int_prop(&p, "a"), Expr::literal(1i64));
    let right = Expr::binary(BinaryOp::Mul, int_prop(&p, "a"), Expr::literal(2i64));
    let root = session.create(
        &Expr::call_static(calc(), "Sum", vec![left, right], Type::Int),
        &options,
    )?;
    assert_eq!(value_of(&session, root), Some(Value::from(4i64)));
    assert_eq!(fixture.sums.get(), 1);

    let updates = Counter::default();
    let u = updates.clone();
    let _s = session.subscribe(root, move |_| u.hit());

    p.set("a", 5);
    assert_eq!(value_of(&session, root), Some(Value::from(16i64)));
    assert_eq!(fixture.sums.get(), 2);
    assert_eq!(updates.get(), 1);

    session.release(root)?;
    Ok(())
}

#[test]
fn host_errors_become_faults() -> Result<()> {
    let fixture = Calc::new()?;
    let session = fixture.session();
    let options = Options::new().shared();
    let p = pair(1, 0);

    let checked = Expr::call_static(calc(), "Check", vec![int_prop(&p, "a")], Type::Int);
    let doubled = Expr::binary(BinaryOp::Mul, checked, Expr::literal(2i64));
    let root = session.create(&doubled, &options)?;
    assert_eq!(value_of(&session, root), Some(Value::from(2i64)));

    p.set("a", -3);
    let fault = fault_of(&session, root).expect("faulted");
    assert_eq!(fault.to_string(), "negative input -3");
    assert!(value_of(&session, root).is_none());

    p.set("a", 4);
    assert_eq!(value_of(&session, root), Some(Value::from(8i64)));
    assert!(fault_of(&session, root).is_none());

    session.release(root)?;
    Ok(())
}

#[test]
fn leftmost_fault_wins() -> Result<()> {
    let fixture = Calc::new()?;
    let session = fixture.session();
    let options = Options::new().shared();

    let fail = || Expr::call_static(calc(), "Fail", vec![], Type::Int);
    let neg = Expr::unary(UnaryOp::Neg, fail());
    let sum = Expr::binary(BinaryOp::Add, fail(), neg.clone());

    let root = session.create(&sum, &options)?;
    let left = session.create(&fail(), &options)?;
    let right = session.create(&neg, &options)?;

    // the unary forwards its operand's fault unchanged
    assert_eq!(fault_of(&session, right), fault_of(&session, left));
    assert_eq!(fault_of(&session, root), fault_of(&session, left));

    for id in [right, left, root] {
        session.release(id)?;
    }
    assert_eq!(session.node_count(), 0);
    Ok(())
}

#[test]
fn faults_short_circuit_like_values() -> Result<()> {
    let fixture = Calc::new()?;
    let session = fixture.session();
    let options = Options::new().shared();
    let flags = Arc::new(ObservableObject::new("Flags").with("on", false));
    let on = prop(&flags, "on", Type::Bool);
    let failing = Expr::binary(
        BinaryOp::Eq,
        Expr::call_static(calc(), "Fail", vec![], Type::Int),
        Expr::literal(0i64),
    );

    let and = session.create(&Expr::and_also(on.clone(), failing.clone()), &options)?;
    let or = session.create(
        &Expr::or_else(Expr::unary(UnaryOp::Not, on.clone()), failing.clone()),
        &options,
    )?;
    assert_eq!(value_of(&session, and), Some(Value::Bool(false)));
    assert_eq!(value_of(&session, or), Some(Value::Bool(true)));

    flags.set("on", true);
    assert!(fault_of(&session, and).is_some());
    assert!(fault_of(&session, or).is_some());

    flags.set("on", false);
    assert_eq!(value_of(&session, and), Some(Value::Bool(false)));
    assert_eq!(value_of(&session, or), Some(Value::Bool(true)));

    session.release(and)?;
    session.release(or)?;
    Ok(())
}

#[test]
fn coalesce_reads_right_only_for_null() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let person = Arc::new(
        ObservableObject::new("Person")
            .with("nickname", Value::Null)
            .with("name", "Ada"),
    );

    let display = Expr::coalesce(
        prop(&person, "nickname", Type::String),
        prop(&person, "name", Type::String),
    );
    let root = session.create(&display, &options)?;
    assert_eq!(value_of(&session, root), Some(Value::from("Ada")));

    person.set("nickname", "Countess");
    assert_eq!(value_of(&session, root), Some(Value::from("Countess")));

    let changes = Counter::default();
    let c = changes.clone();
    let _s = session.subscribe(root, move |_| c.hit());
    person.set("name", "Augusta");
    assert_eq!(changes.get(), 0);

    person.set("nickname", Value::Null);
    assert_eq!(value_of(&session, root), Some(Value::from("Augusta")));
    assert_eq!(changes.get(), 1);

    session.release(root)?;
    Ok(())
}

#[test]
fn conditional_follows_selected_branch() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let p = Arc::new(
        ObservableObject::new("Pair")
            .with("flag", false)
            .with("a", 1i64)
            .with("b", 2i64),
    );

    let choice = Expr::conditional(
        prop(&p, "flag", Type::Bool),
        int_prop(&p, "a"),
        int_prop(&p, "b"),
    );
    let root = session.create(&choice, &options)?;
    assert_eq!(value_of(&session, root), Some(Value::from(2i64)));

    let changes = Counter::default();
    let c = changes.clone();
    let _s = session.subscribe(root, move |_| c.hit());

    p.set("a", 100);
    assert_eq!(changes.get(), 0);

    p.set("b", 7);
    assert_eq!(changes.get(), 1);
    assert_eq!(value_of(&session, root), Some(Value::from(7i64)));

    p.set("flag", true);
    assert_eq!(changes.get(), 2);
    assert_eq!(value_of(&session, root), Some(Value::from(100i64)));

    session.release(root)?;
    Ok(())
}

#[test]
fn non_boolean_short_circuit_is_rejected() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();

    let bad = Expr::and_also(Expr::literal(true), Expr::literal(1i64));
    match session.create(&bad, &options) {
        Err(Error::Construction(ConstructionError::NonBooleanOperand { found, .. })) => {
            assert_eq!(found, Type::Int)
        }
        other => panic!("unexpected {other:?}"),
    }
    // operands built before the failure were given back
    assert_eq!(session.node_count(), 0);
    Ok(())
}

#[test]
fn construction_errors_leave_no_nodes() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let p = pair(1, 2);

    let unsupported = Expr::binary_typed(
        BinaryOp::Add,
        int_prop(&p, "a"),
        Expr::literal(true),
        Type::Int,
    );
    let err = session.create(&unsupported, &options).unwrap_err();
    assert_eq!(
        err.to_string(),
        "operator `+` is not defined for (int, bool) -> int"
    );

    let unbound = Expr::binary(
        BinaryOp::Add,
        int_prop(&p, "a"),
        Expr::parameter("x", Type::Int),
    );
    assert!(matches!(
        session.create(&unbound, &options),
        Err(Error::Construction(ConstructionError::UnboundParameter(_)))
    ));

    let static_member = Expr::static_property(Type::host("Clock"), "Now", Type::Int);
    assert!(matches!(
        session.create(&static_member, &options),
        Err(Error::Construction(ConstructionError::MemberNotFound(_)))
    ));

    assert_eq!(session.node_count(), 0);
    assert_eq!(p.subscriber_count(), 0);
    Ok(())
}

#[test]
fn coalesce_with_conversion_is_rejected() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();

    let identity = Lambda::new(
        vec![Parameter::new("s", Type::String)],
        Expr::parameter("s", Type::String),
    );
    let expr = Ref::new(Expr::Binary {
        op: BinaryOp::Coalesce,
        left: Expr::constant(Value::Null, Type::String),
        right: Expr::literal("x"),
        ty: Type::String,
        conversion: Some(Ref::new(identity)),
    });
    assert!(matches!(
        session.create(&expr, &options),
        Err(Error::Construction(ConstructionError::CoalesceConversion))
    ));
    assert_eq!(session.node_count(), 0);
    Ok(())
}

#[test]
fn lifted_operators_propagate_null() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let maybe = Arc::new(ObservableObject::new("Maybe").with("n", Value::Null));
    let n = prop(&maybe, "n", Type::nullable(Type::Int));

    let sum = session.create(
        &Expr::binary(BinaryOp::Add, n.clone(), Expr::literal(1i64)),
        &options,
    )?;
    let is_null = session.create(
        &Expr::binary(
            BinaryOp::Eq,
            n.clone(),
            Expr::constant(Value::Null, Type::nullable(Type::Int)),
        ),
        &options,
    )?;
    let less = session.create(
        &Expr::binary(BinaryOp::Lt, n.clone(), Expr::literal(10i64)),
        &options,
    )?;
    let negated = session.create(&Expr::unary(UnaryOp::Neg, n.clone()), &options)?;
    let unwrapped = session.create(&Expr::convert(n.clone(), Type::Int), &options)?;

    assert_eq!(value_of(&session, sum), Some(Value::Null));
    assert_eq!(value_of(&session, is_null), Some(Value::Bool(true)));
    assert_eq!(value_of(&session, less), Some(Value::Bool(false)));
    assert_eq!(value_of(&session, negated), Some(Value::Null));
    let fault = fault_of(&session, unwrapped).expect("null cannot be unwrapped");
    assert!(matches!(
        fault.downcast_ref::<EvalError>(),
        Some(EvalError::NullReference(_))
    ));

    maybe.set("n", 4);
    assert_eq!(value_of(&session, sum), Some(Value::from(5i64)));
    assert_eq!(value_of(&session, is_null), Some(Value::Bool(false)));
    assert_eq!(value_of(&session, less), Some(Value::Bool(true)));
    assert_eq!(value_of(&session, negated), Some(Value::from(-4i64)));
    assert_eq!(value_of(&session, unwrapped), Some(Value::from(4i64)));

    for id in [sum, is_null, less, negated, unwrapped] {
        session.release(id)?;
    }
    assert_eq!(session.node_count(), 0);
    Ok(())
}

#[test]
fn checked_arithmetic_faults_on_overflow() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let p = pair(i64::MAX - 1, 0);

    let bumped = Expr::binary(BinaryOp::AddChecked, int_prop(&p, "a"), Expr::literal(1i64));
    let root = session.create(&bumped, &options)?;
    assert_eq!(value_of(&session, root), Some(Value::from(i64::MAX)));

    p.set("a", i64::MAX);
    let fault = fault_of(&session, root).expect("overflow");
    assert!(matches!(
        fault.downcast_ref::<EvalError>(),
        Some(EvalError::Overflow)
    ));

    session.release(root)?;
    Ok(())
}

#[test]
fn list_index_tracks_position() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let list = Arc::new(ObservableList::from_values(vec![
        Value::from(10i64),
        Value::from(20i64),
        Value::from(30i64),
    ]));
    let at = |i: i64| {
        Expr::index(
            Expr::constant(Value::host(list.clone()), Type::host("ObservableList")),
            vec![Expr::literal(i)],
            Type::Int,
        )
    };

    let second = session.create(&at(1), &options)?;
    assert_eq!(value_of(&session, second), Some(Value::from(20i64)));

    let changes = Counter::default();
    let c = changes.clone();
    let _s = session.subscribe(second, move |_| c.hit());

    list.set(2, 99)?;
    list.push(40);
    assert_eq!(changes.get(), 0);

    list.insert(0, 5)?;
    assert_eq!(value_of(&session, second), Some(Value::from(10i64)));

    list.remove_at(0)?;
    assert_eq!(value_of(&session, second), Some(Value::from(20i64)));

    list.move_item(1, 3)?;
    assert_eq!(value_of(&session, second), Some(Value::from(99i64)));
    assert_eq!(changes.get(), 3);

    list.clear();
    let fault = fault_of(&session, second).expect("out of range");
    assert!(matches!(
        fault.downcast_ref::<EvalError>(),
        Some(EvalError::IndexOutOfRange { index: 1, len: 0 })
    ));

    list.push(1);
    list.push(2);
    assert_eq!(value_of(&session, second), Some(Value::from(2i64)));

    session.release(second)?;
    assert_eq!(list.subscriber_count(), 0);
    Ok(())
}

#[test]
fn dictionary_index_applies_key_changes() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let map = Arc::new(ObservableMap::new());
    map.insert("k", 1);

    let entry = Expr::index(
        Expr::constant(Value::host(map.clone()), Type::host("ObservableMap")),
        vec![Expr::literal("k")],
        Type::Int,
    );
    let root = session.create(&entry, &options)?;
    assert_eq!(value_of(&session, root), Some(Value::from(1i64)));

    let changes = Counter::default();
    let c = changes.clone();
    let _s = session.subscribe(root, move |_| c.hit());

    map.insert("k", 2);
    assert_eq!(value_of(&session, root), Some(Value::from(2i64)));

    map.insert("other", 3);
    map.extend(vec![(Value::from("x"), Value::from(0i64))]);
    assert_eq!(changes.get(), 1);

    map.remove(&Value::from("k"));
    let fault = fault_of(&session, root).expect("key removed");
    match fault.downcast_ref::<EvalError>() {
        Some(EvalError::KeyNotFound(k)) => assert_eq!(k, &Value::from("k")),
        other => panic!("unexpected {other:?}"),
    }

    map.extend(vec![(Value::from("k"), Value::from(5i64))]);
    assert_eq!(value_of(&session, root), Some(Value::from(5i64)));

    map.clear();
    assert!(fault_of(&session, root).is_some());

    map.insert("k", 6);
    assert_eq!(value_of(&session, root), Some(Value::from(6i64)));

    session.release(root)?;
    assert_eq!(map.subscriber_count(), 0);
    Ok(())
}

#[test]
fn member_follows_replaced_object() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let first = pair(1, 0);
    let second = pair(2, 0);
    let holder = Arc::new(ObservableObject::new("Holder").with("current", Value::host(first.clone())));

    let current = prop(&holder, "current", Type::host("Pair"));
    let root = session.create(&Expr::property(current, "a", Type::Int), &options)?;
    assert_eq!(value_of(&session, root), Some(Value::from(1i64)));
    assert_eq!(first.subscriber_count(), 1);

    holder.set("current", Value::host(second.clone()));
    assert_eq!(value_of(&session, root), Some(Value::from(2i64)));
    assert_eq!(first.subscriber_count(), 0);
    assert_eq!(second.subscriber_count(), 1);

    first.set("a", 10);
    assert_eq!(value_of(&session, root), Some(Value::from(2i64)));
    second.set("a", 20);
    assert_eq!(value_of(&session, root), Some(Value::from(20i64)));

    holder.set("current", Value::Null);
    let fault = fault_of(&session, root).expect("null receiver");
    assert!(matches!(
        fault.downcast_ref::<EvalError>(),
        Some(EvalError::NullReference(_))
    ));
    assert!(!session.is_watching(root));

    session.release(root)?;
    assert_eq!(holder.subscriber_count(), 0);
    Ok(())
}

#[test]
fn handlers_may_mutate_during_propagation() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let p = pair(1, 10);

    let a = session.create(&int_prop(&p, "a"), &options)?;
    let b = session.create(&int_prop(&p, "b"), &options)?;

    let target = p.clone();
    let _s = session.subscribe(a, move |outcome| {
        if let Some(v) = outcome.value().and_then(|v| v.as_i64().ok()) {
            target.set("b", v * 10);
        }
    });

    p.set("a", 3);
    assert_eq!(value_of(&session, b), Some(Value::from(30i64)));

    session.release(a)?;
    session.release(b)?;
    Ok(())
}

#[test]
fn handlers_may_release_nodes() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let p = pair(1, 2);

    let a = session.create(&int_prop(&p, "a"), &options)?;
    let b = session.create(&int_prop(&p, "b"), &options)?;

    let handle = session.clone();
    let pending: Arc<Mutex<Option<NodeId>>> = Arc::new(Mutex::new(Some(b)));
    let slot = pending.clone();
    let _s = session.subscribe(a, move |_| {
        if let Some(id) = slot.lock().take() {
            let _ = handle.release(id);
        }
    });

    p.set("a", 5);
    assert!(pending.lock().is_none());
    assert!(session.outcome(b).is_none());
    assert_eq!(value_of(&session, a), Some(Value::from(5i64)));

    session.release(a)?;
    assert_eq!(session.node_count(), 0);
    Ok(())
}

#[test]
fn concurrent_creation_interns_once() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    let p = pair(3, 4);

    let ids: Vec<NodeId> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                let options = options.clone();
                let p = p.clone();
                s.spawn(move || {
                    let sum = Expr::binary(BinaryOp::Add, int_prop(&p, "a"), int_prop(&p, "b"));
                    session.create(&sum, &options)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?;

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(session.refcount(ids[0]), 8);
    assert_eq!(session.node_count(), 4);
    assert_eq!(value_of(&session, ids[0]), Some(Value::from(7i64)));

    for id in ids {
        session.release(id)?;
    }
    assert_eq!(session.node_count(), 0);
    Ok(())
}
