//! Tests around the lifecycle of objects.

use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    rc::Rc,
};

use heritage::{ArgSpec, Engine, Error, ErrorKind, Protection, Value};

use super::{engine, eval, RevealResultExt};

type Log = Rc<RefCell<Vec<String>>>;

fn logging(log: &Log, entry: &str) -> impl Fn(&mut Engine, &[Value]) -> Result<Value, Error> {
    let (log, entry) = (Rc::clone(log), entry.to_owned());
    move |_, _| {
        log.borrow_mut().push(entry.clone());
        Ok(Value::empty())
    }
}

/// `C` inherits `B`, `B` inherits `A`. Every level logs its construction and destruction.
fn chain_of_three(engine: &mut Engine, log: &Log) {
    for (class, base) in [("A", None), ("B", Some("A")), ("C", Some("B"))] {
        let mut builder = engine.build_class(class).reveal();
        if let Some(base) = base {
            builder = builder.inherit(&[base]).reveal();
        }
        builder
            .constructor("", logging(log, &format!("construct {class}")))
            .reveal()
            .destructor(logging(log, &format!("destruct {class}")))
            .reveal();
    }
}

#[test]
fn destruction_runs_in_reverse_construction_order() {
    let mut engine = engine();
    let log = Log::default();
    chain_of_three(&mut engine, &log);

    assert_eq!(eval(&mut engine, ["C", "c"]), "c");
    assert_eq!(*log.borrow(), ["construct A", "construct B", "construct C"]);
    log.borrow_mut().clear();

    engine.delete_object("c").reveal();
    assert_eq!(*log.borrow(), ["destruct C", "destruct B", "destruct A"]);
    assert!(!engine.is_object("c", None));
}

#[test]
fn failed_construction_is_rolled_back() {
    let mut engine = engine();
    let log = Log::default();
    chain_of_three(&mut engine, &log);
    engine
        .build_class("D")
        .reveal()
        .inherit(&["C"])
        .reveal()
        .constructor("", |_, _| Err(Error::user("no more room")))
        .reveal();

    let error = engine.call(["D", "d"]).err().unwrap();
    assert!(matches!(error.kind(), ErrorKind::ConstructionFailure { .. }));
    assert_eq!(error.to_string(), "no more room");
    assert!(error.error_info().iter().any(|line| line.contains("while constructing object")));
    assert_eq!(
        *log.borrow(),
        [
            "construct A",
            "construct B",
            "construct C",
            "destruct C",
            "destruct B",
            "destruct A"
        ]
    );
    assert!(!engine.is_object("d", None));
    assert!(engine.find_objects(None, None, None).reveal().is_empty());
    assert!(engine.call(["d", "info", "class"]).is_err());
}

#[test]
fn auto_names_never_collide() {
    let mut engine = engine();
    engine.build_class("Counter").reveal();
    eval(&mut engine, ["Counter", "counter1"]);

    let names: Vec<String> = (0..5).map(|_| eval(&mut engine, ["Counter", "#auto"])).collect();
    assert_eq!(names[0], "counter0");
    assert!(!names.contains(&String::from("counter1")));
    let distinct: HashSet<&String> = names.iter().collect();
    assert_eq!(distinct.len(), names.len());

    assert_eq!(eval(&mut engine, ["Counter", "widget.#auto"]), "widget.counter6");
}

#[test]
fn failing_destructors_keep_the_object_alive() {
    let mut engine = engine();
    let attempts = Rc::new(Cell::new(0));
    let counter = Rc::clone(&attempts);
    engine
        .build_class("Stubborn")
        .reveal()
        .destructor(move |_, _| {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                Err(Error::user("not yet"))
            } else {
                Ok(Value::empty())
            }
        })
        .reveal();
    eval(&mut engine, ["Stubborn", "s"]);

    let error = engine.delete_object("s").err().unwrap();
    assert!(matches!(error.kind(), ErrorKind::DestructionFailure { .. }));
    assert!(engine.is_object("s", Some("Stubborn")));

    engine.delete_object("s").reveal();
    assert_eq!(attempts.get(), 2);
    assert!(!engine.is_object("s", None));
}

#[test]
fn constructor_arguments_are_bound() {
    let mut engine = engine();
    engine
        .build_class("Point")
        .reveal()
        .variable(Protection::Private, "coords", None)
        .reveal()
        .constructor("x {y 0}", |engine, _| {
            let coords = format!("{} {}", engine.var("x")?, engine.var("y")?);
            engine.set_var("coords", coords)
        })
        .reveal()
        .method(Protection::Public, "coords", ArgSpec::new(), |engine, _| engine.var("coords"))
        .reveal();

    eval(&mut engine, ["Point", "p", "3"]);
    assert_eq!(eval(&mut engine, ["p", "coords"]), "3 0");

    let error = engine.call(["Point", "q"]).err().unwrap();
    assert_eq!(error.to_string(), "wrong # args: should be \"::Point::constructor x ?y?\"");
    assert!(!engine.is_object("q", None));
}

#[test]
fn bases_can_be_constructed_with_arguments() {
    let mut engine = engine();
    engine
        .build_class("Named")
        .reveal()
        .variable(Protection::Protected, "label", None)
        .reveal()
        .constructor("name", |engine, args| engine.set_var("label", args[0].clone()))
        .reveal()
        .method(Protection::Public, "label", ArgSpec::new(), |engine, _| engine.var("label"))
        .reveal();
    engine
        .build_class("Pet")
        .reveal()
        .inherit(&["Named"])
        .reveal()
        .constructor_with_init(
            "kind",
            |engine, args| {
                let name = format!("a {}", args[0]);
                engine.construct_base("Named", &[Value::from(name)])
            },
            |_, _| Ok(Value::empty()),
        )
        .reveal();

    eval(&mut engine, ["Pet", "rex", "dog"]);
    assert_eq!(eval(&mut engine, ["rex", "label"]), "a dog");
}

#[test]
fn same_named_variables_stay_distinct_across_levels() {
    let mut engine = engine();
    engine
        .build_class("Base")
        .reveal()
        .variable(Protection::Private, "x", Some("base"))
        .reveal()
        .method(Protection::Public, "base_x", ArgSpec::new(), |engine, _| engine.var("x"))
        .reveal();
    engine
        .build_class("Derived")
        .reveal()
        .inherit(&["Base"])
        .reveal()
        .variable(Protection::Private, "x", Some("derived"))
        .reveal()
        .method(Protection::Public, "derived_x", ArgSpec::new(), |engine, _| engine.var("x"))
        .reveal();

    eval(&mut engine, ["Derived", "d"]);
    assert_eq!(eval(&mut engine, ["d", "base_x"]), "base");
    assert_eq!(eval(&mut engine, ["d", "derived_x"]), "derived");
}

#[test]
fn renamed_objects_know_their_new_name() {
    let mut engine = engine();
    engine
        .build_class("Ego")
        .reveal()
        .method(Protection::Public, "whoami", ArgSpec::new(), |engine, _| engine.this())
        .reveal();
    eval(&mut engine, ["Ego", "before"]);

    engine.rename_command("before", "after").reveal();
    assert!(!engine.is_object("before", None));
    assert_eq!(eval(&mut engine, ["after", "whoami"]), "::after");

    engine.rename_command("after", "").reveal();
    assert!(!engine.is_object("after", None));
}

#[test]
fn objects_can_be_found_by_class_and_pattern() {
    let mut engine = engine();
    engine.build_class("Animal").reveal();
    engine.build_class("Cat").reveal().inherit(&["Animal"]).reveal();
    eval(&mut engine, ["Animal", "generic"]);
    eval(&mut engine, ["Cat", "tom"]);
    eval(&mut engine, ["Cat", "tabby"]);

    let names = |found: Vec<Rc<str>>| found.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    let all = names(engine.find_objects(None, None, None).reveal());
    assert_eq!(all, ["::generic", "::tabby", "::tom"]);
    let cats = names(engine.find_objects(None, Some("Cat"), None).reveal());
    assert_eq!(cats, ["::tabby", "::tom"]);
    let animals = names(engine.find_objects(None, None, Some("Animal")).reveal());
    assert_eq!(animals, ["::generic", "::tabby", "::tom"]);
    let t = names(engine.find_objects(Some("t*"), None, None).reveal());
    assert_eq!(t, ["::tabby", "::tom"]);
    assert_eq!(&*engine.object_class("tom").reveal(), "::Cat");
}

#[test]
fn objects_can_delete_themselves_from_methods() {
    let mut engine = engine();
    engine
        .build_class("Ephemeral")
        .reveal()
        .method(Protection::Public, "vanish", ArgSpec::new(), |engine, _| {
            let this = engine.this()?;
            engine.delete_object(&this.as_str())?;
            Ok(Value::from("gone"))
        })
        .reveal();
    eval(&mut engine, ["Ephemeral", "e"]);

    assert_eq!(eval(&mut engine, ["e", "vanish"]), "gone");
    assert!(!engine.is_object("e", None));
}
