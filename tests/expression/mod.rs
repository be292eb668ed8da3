// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::common::*;

use std::sync::Arc;

use anyhow::Result;
use liveexpr::*;
use parking_lot::Mutex;

fn pair_type() -> Type {
    Type::host("Pair")
}

fn sum_lambda() -> Lambda {
    let p = || Expr::parameter("p", pair_type());
    Lambda::new(
        vec![Parameter::new("p", pair_type())],
        Expr::binary(
            BinaryOp::Add,
            Expr::property(p(), "a", Type::Int),
            Expr::property(p(), "b", Type::Int),
        ),
    )
}

#[test]
fn activation_tracks_arguments() -> Result<()> {
    let session = Session::new();
    let p = pair(2, 3);

    let sum: ActiveExpression<i64> = session.activate(&sum_lambda(), vec![Value::host(p.clone())])?;
    assert_eq!(sum.value(), 5);
    assert!(sum.fault().is_none());

    let updates: Arc<Mutex<Vec<i64>>> = Arc::default();
    let log = updates.clone();
    let _s = sum.subscribe(move |u| log.lock().push(u.value));

    p.set("b", 10);
    assert_eq!(sum.value(), 12);
    p.set("a", 0);
    assert_eq!(*updates.lock(), vec![12, 10]);

    assert!(sum.dispose()?);
    assert_eq!(session.node_count(), 0);
    assert_eq!(p.subscriber_count(), 0);
    Ok(())
}

#[test]
fn equal_activations_share_a_root() -> Result<()> {
    let session = Session::new();
    let p = pair(1, 1);
    let q = pair(1, 1);

    let first: ActiveExpression<i64> = session.activate(&sum_lambda(), vec![Value::host(p.clone())])?;
    let second: ActiveExpression<i64> = session.activate(&sum_lambda(), vec![Value::host(p.clone())])?;
    let other: ActiveExpression<i64> = session.activate(&sum_lambda(), vec![Value::host(q.clone())])?;
    assert_eq!(first.root(), second.root());
    assert_ne!(first.root(), other.root());
    assert_eq!(session.refcount(first.root()), 1);

    let root = first.root();
    assert!(!first.dispose()?);
    assert_eq!(second.value(), 2);
    assert!(session.outcome(root).is_some());

    drop(second);
    assert!(session.outcome(root).is_none());
    assert_eq!(other.value(), 2);
    drop(other);
    assert_eq!(session.node_count(), 0);
    Ok(())
}

#[test]
fn options_instance_is_part_of_identity() -> Result<()> {
    let session = Session::new();
    let p = pair(1, 2);
    let args = || vec![Value::host(p.clone())];
    let custom = Options::new().shared();

    let shared: ActiveExpression = session.activate(&sum_lambda(), args())?;
    let separate: ActiveExpression = session.activate_with(&sum_lambda(), args(), &custom)?;
    assert_ne!(shared.root(), separate.root());
    assert_eq!(shared.value(), separate.value());

    assert!(session.options().is_frozen());
    assert!(custom.is_frozen());
    Ok(())
}

#[test]
fn argument_count_is_checked() -> Result<()> {
    let session = Session::new();
    let result = session.activate::<i64>(&sum_lambda(), vec![]);
    assert!(matches!(
        result,
        Err(Error::Construction(ConstructionError::ArgumentCount {
            expected: 1,
            actual: 0
        }))
    ));
    assert_eq!(session.node_count(), 0);
    Ok(())
}

#[test]
fn wrong_runtime_type_reads_as_default() -> Result<()> {
    let session = Session::new();
    let bag = Arc::new(ObservableObject::new("Bag").with("item", "text"));
    let lambda = Lambda::new(
        vec![Parameter::new("b", Type::host("Bag"))],
        Expr::property(Expr::parameter("b", Type::host("Bag")), "item", Type::Any),
    );

    let as_int: ActiveExpression<i64> = session.activate(&lambda, vec![Value::host(bag.clone())])?;
    let as_text: ActiveExpression<String> = session.activate(&lambda, vec![Value::host(bag.clone())])?;
    assert_eq!(as_int.root(), as_text.root());
    assert_eq!(as_int.value(), 0);
    assert!(as_int.fault().is_none());
    assert_eq!(as_text.value(), "text");

    bag.set("item", 7);
    assert_eq!(as_int.value(), 7);
    assert_eq!(as_text.value(), "");

    let as_optional: ActiveExpression<Option<i64>> =
        session.activate(&lambda, vec![Value::host(bag.clone())])?;
    bag.set("item", Value::Null);
    assert_eq!(as_optional.value(), None);
    Ok(())
}

#[test]
fn faulted_expression_reads_default() -> Result<()> {
    let fixture = Calc::new()?;
    let session = fixture.session();
    let p = pair(5, 0);
    let lambda = Lambda::new(
        vec![Parameter::new("p", pair_type())],
        Expr::call_static(
            calc(),
            "Check",
            vec![Expr::property(
                Expr::parameter("p", pair_type()),
                "a",
                Type::Int,
            )],
            Type::Int,
        ),
    );

    let checked: ActiveExpression<i64> = session.activate(&lambda, vec![Value::host(p.clone())])?;
    assert_eq!(checked.value(), 5);

    let faults: Arc<Mutex<Vec<String>>> = Arc::default();
    let log = faults.clone();
    let _s = checked.subscribe(move |u: &Update<i64>| {
        if let Some(f) = &u.fault {
            log.lock().push(format!("{} -> {}", u.value, f));
        }
    });

    p.set("a", -1);
    assert_eq!(checked.value(), 0);
    assert_eq!(
        checked.fault().map(|f| f.to_string()),
        Some("negative input -1".to_string())
    );
    assert_eq!(*faults.lock(), vec!["0 -> negative input -1".to_string()]);
    Ok(())
}

#[test]
fn constructed_values_are_disposed_once() -> Result<()> {
    let factory = Factory::new()?;
    let session = factory.session();
    let options = Options::new().shared();
    let p = pair(1, 0);

    let make = Expr::construct(resource(), vec![int_prop(&p, "a")]);
    let root = session.create(&make, &options)?;
    assert_eq!(factory.count(), 1);

    p.set("a", 2);
    assert_eq!(factory.count(), 2);
    assert_eq!(factory.instance(0).dispose_count(), 1);
    assert_eq!(factory.instance(1).dispose_count(), 0);

    assert!(session.release(root)?);
    assert_eq!(factory.instance(0).dispose_count(), 1);
    assert_eq!(factory.instance(1).dispose_count(), 1);
    Ok(())
}

#[test]
fn disposal_can_be_switched_off() -> Result<()> {
    let factory = Factory::new()?;
    let session = factory.session();
    let options = Options::new();
    options.set_dispose_constructed_objects(false)?;
    let options = options.shared();
    let p = pair(1, 0);

    let root = session.create(&Expr::construct(resource(), vec![int_prop(&p, "a")]), &options)?;
    p.set("a", 2);
    session.release(root)?;
    assert_eq!(factory.instance(0).dispose_count(), 0);
    assert_eq!(factory.instance(1).dispose_count(), 0);
    Ok(())
}

#[test]
fn explicit_registration_adds_disposal() -> Result<()> {
    let factory = Factory::new()?;
    let session = factory.session();
    let p = pair(1, 0);
    let ctor = ConstructorDescriptor::new(resource(), vec![Type::Int]);

    let options = Options::new();
    options.set_dispose_constructed_objects(false)?;
    assert!(options.add_constructed_type_disposal(ctor.clone())?);
    assert!(!options.add_constructed_type_disposal(ctor.clone())?);
    let options = options.shared();

    let root = session.create(&Expr::construct(resource(), vec![int_prop(&p, "a")]), &options)?;
    session.release(root)?;
    assert_eq!(factory.instance(0).dispose_count(), 1);
    Ok(())
}

#[test]
fn options_freeze_on_first_use() -> Result<()> {
    let session = Session::new();
    let options = Options::new().shared();
    assert!(!options.is_frozen());
    options.set_dispose_static_method_return_values(false)?;

    let id = session.create(&Expr::literal(1i64), &options)?;
    assert!(options.is_frozen());
    assert!(matches!(
        options.set_dispose_constructed_objects(false),
        Err(OptionsError::Frozen)
    ));
    assert!(!options.dispose_static_method_return_values());

    session.release(id)?;
    assert!(options.is_frozen());
    Ok(())
}

#[test]
fn disposal_failures_are_reported() -> Result<()> {
    let factory = Factory::new()?;
    let session = factory.session();
    let options = Options::new().shared();
    let p = pair(1, 0);

    let failures: Arc<Mutex<Vec<String>>> = Arc::default();
    let log = failures.clone();
    let _s = session.on_disposal_failed(move |e| log.lock().push(e.to_string()));

    let broken = Expr::construct(Type::host("Broken"), vec![int_prop(&p, "a")]);
    let root = session.create(&broken, &options)?;

    // the new value is committed even though disposing the old one failed
    p.set("a", 2);
    assert_eq!(failures.lock().len(), 1);
    assert!(failures.lock()[0].starts_with("disposing"));
    assert!(matches!(
        session.outcome(root),
        Some(Outcome::Value(Value::Host(_)))
    ));

    match session.release(root) {
        Err(Error::Disposal(e)) => assert_eq!(e.source.to_string(), "already closed"),
        other => panic!("unexpected {other:?}"),
    }
    // teardown completed regardless
    assert_eq!(session.node_count(), 0);
    assert_eq!(p.subscriber_count(), 0);
    Ok(())
}

#[test]
fn static_method_results_follow_default() -> Result<()> {
    let invoker = Invoker::new();
    let created: Arc<Mutex<Vec<Arc<ObservableObject>>>> = Arc::default();
    let log = created.clone();
    invoker.register_method(
        MethodDescriptor::static_method(Type::host("Pool"), "Rent", vec![Type::Int]),
        move |_, args| {
            let r = Arc::new(ObservableObject::new("Lease").with("size", args[0].clone()));
            log.lock().push(r.clone());
            Ok(Value::host(r))
        },
    )?;
    let session = Session::builder().with_invoker(Arc::new(invoker)).build();
    let p = pair(1, 0);

    let rent = || {
        Expr::call_static(
            Type::host("Pool"),
            "Rent",
            vec![int_prop(&p, "a")],
            Type::host("Lease"),
        )
    };

    let keep = Options::new();
    keep.set_dispose_static_method_return_values(false)?;
    let keep = keep.shared();
    let dispose = Options::new().shared();

    let kept = session.create(&rent(), &keep)?;
    let disposed = session.create(&rent(), &dispose)?;
    assert_ne!(kept, disposed);

    session.release(kept)?;
    session.release(disposed)?;
    let leases = created.lock();
    assert_eq!(leases.len(), 2);
    assert_eq!(leases[0].dispose_count(), 0);
    assert_eq!(leases[1].dispose_count(), 1);
    Ok(())
}

#[test]
fn member_kind_and_result_type_are_part_of_identity() -> Result<()> {
    let session = Session::new();
    let p = pair(1, 2);
    let param = || Expr::parameter("o", pair_type());
    let of = |body: ExprRef| Lambda::new(vec![Parameter::new("o", pair_type())], body);

    let as_field = of(Expr::field(param(), "a", Type::Int));
    let as_property = of(Expr::property(param(), "a", Type::Int));
    let as_any = of(Expr::property(param(), "a", Type::Any));
    assert_eq!(as_field.to_string(), as_property.to_string());

    let field: ActiveExpression<i64> = session.activate(&as_field, vec![Value::host(p.clone())])?;
    let property: ActiveExpression<i64> =
        session.activate(&as_property, vec![Value::host(p.clone())])?;
    let dynamic: ActiveExpression<i64> = session.activate(&as_any, vec![Value::host(p.clone())])?;
    assert_ne!(field.root(), property.root());
    assert_ne!(property.root(), dynamic.root());

    p.set("a", 9);
    assert_eq!(property.value(), 9);
    assert_eq!(dynamic.value(), 9);
    // fields are read once and never watched
    assert_eq!(field.value(), 1);
    Ok(())
}

#[test]
fn host_constants_are_compared_by_identity() -> Result<()> {
    let session = Session::new();
    let (p, q) = (pair(1, 0), pair(2, 0));
    let over = |o: &Arc<ObservableObject>| Lambda::new(vec![], int_prop(o, "a"));
    assert_eq!(over(&p).to_string(), over(&q).to_string());

    let first: ActiveExpression<i64> = session.activate(&over(&p), vec![])?;
    let second: ActiveExpression<i64> = session.activate(&over(&q), vec![])?;
    assert_ne!(first.root(), second.root());
    assert_eq!((first.value(), second.value()), (1, 2));
    Ok(())
}

#[test]
fn untyped_reads_of_a_fault_are_null() -> Result<()> {
    let fixture = Calc::new()?;
    let session = fixture.session();
    let lambda = Lambda::new(vec![], Expr::call_static(calc(), "Fail", vec![], Type::Int));

    let failing: ActiveExpression<Value> = session.activate(&lambda, vec![])?;
    assert_eq!(failing.value(), Value::Null);
    assert_eq!(Value::default(), Value::Null);
    assert!(failing.fault().is_some());
    Ok(())
}
