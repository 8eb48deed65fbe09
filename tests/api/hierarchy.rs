//! Tests around inheritance, member resolution and virtual dispatch.

use heritage::{ArgSpec, Engine, Error, ErrorKind, Protection, Value};

use super::{engine, eval, RevealResultExt};

fn returning(value: &'static str) -> impl Fn(&mut Engine, &[Value]) -> Result<Value, Error> {
    move |_, _| Ok(Value::from(value))
}

/// `C` inherits `A` and `B`, `B` inherits `A`.
fn diamond(engine: &mut Engine) {
    engine.build_class("A").reveal();
    engine.build_class("B").reveal().inherit(&["A"]).reveal();
    engine.build_class("C").reveal().inherit(&["A", "B"]).reveal();
}

#[test]
fn hierarchies_are_walked_depth_first() {
    let mut engine = engine();
    diamond(&mut engine);

    let walk: Vec<String> =
        engine.heritage_walk("C").reveal().iter().map(|name| name.to_string()).collect();
    assert_eq!(walk, ["::C", "::A", "::B", "::A"]);
}

#[test]
fn info_heritage_visits_every_class_once() {
    let mut engine = engine();
    diamond(&mut engine);
    eval(&mut engine, ["C", "c"]);

    assert_eq!(eval(&mut engine, ["c", "info", "heritage"]), "::C ::A ::B");
    assert_eq!(eval(&mut engine, ["c", "info", "inherit"]), "::A ::B");
    assert_eq!(eval(&mut engine, ["c", "info", "class"]), "::C");
    assert_eq!(eval(&mut engine, ["c", "isa", "A"]), "1");
    assert_eq!(eval(&mut engine, ["c", "isa", "C"]), "1");

    engine.build_class("Unrelated").reveal();
    assert_eq!(eval(&mut engine, ["c", "isa", "Unrelated"]), "0");
}

#[test]
fn inheritance_is_declared_once_and_never_cyclic() {
    let mut engine = engine();
    engine.build_class("A").reveal();
    engine.build_class("B").reveal().inherit(&["A"]).reveal();

    assert!(engine.class_builder("A").and_then(|a| a.inherit(&["B"])).is_err());
    assert!(engine.class_builder("B").and_then(|b| b.inherit(&["A"])).is_err());
    assert!(engine.build_class("Self").and_then(|c| c.inherit(&["Self"])).is_err());
    assert!(engine.build_class("Twice").and_then(|c| c.inherit(&["A", "A"])).is_err());
    let error = engine.build_class("Orphan").and_then(|c| c.inherit(&["Nope"])).err().unwrap();
    assert!(matches!(error.kind(), ErrorKind::NotFound { what: "class", .. }));
}

#[test]
fn derived_members_shadow_base_members() {
    let mut engine = engine();
    engine
        .build_class("Base")
        .reveal()
        .method(Protection::Public, "who", ArgSpec::new(), returning("base"))
        .reveal();
    engine
        .build_class("Derived")
        .reveal()
        .inherit(&["Base"])
        .reveal()
        .method(Protection::Public, "who", ArgSpec::new(), returning("derived"))
        .reveal();

    for spelling in ["who", "Derived::who", "::Derived::who"] {
        let resolved = engine.resolve_function("Derived", spelling).reveal();
        assert_eq!(resolved.as_deref(), Some("::Derived::who"));
    }
    let resolved = engine.resolve_function("Derived", "Base::who").reveal();
    assert_eq!(resolved.as_deref(), Some("::Base::who"));
    let resolved = engine.resolve_function("Base", "who").reveal();
    assert_eq!(resolved.as_deref(), Some("::Base::who"));

    eval(&mut engine, ["Derived", "d"]);
    assert_eq!(eval(&mut engine, ["d", "who"]), "derived");
}

#[test]
fn unqualified_method_calls_are_virtual() {
    let mut engine = engine();
    engine
        .build_class("Base")
        .reveal()
        .method(Protection::Protected, "name", ArgSpec::new(), returning("base"))
        .reveal()
        .method(Protection::Public, "describe", ArgSpec::new(), |engine, _| {
            let name = engine.call(["name"])?;
            let own = engine.call(["Base::name"])?;
            Ok(format!("{name}/{own}").into())
        })
        .reveal();
    engine
        .build_class("Derived")
        .reveal()
        .inherit(&["Base"])
        .reveal()
        .method(Protection::Protected, "name", ArgSpec::new(), returning("derived"))
        .reveal();

    eval(&mut engine, ["Derived", "d"]);
    assert_eq!(eval(&mut engine, ["d", "describe"]), "derived/base");
}

#[test]
fn chain_calls_the_next_implementation() {
    let mut engine = engine();
    engine
        .build_class("Base")
        .reveal()
        .method(Protection::Public, "who", ArgSpec::new(), returning("base"))
        .reveal();
    engine
        .build_class("Middle")
        .reveal()
        .inherit(&["Base"])
        .reveal()
        .method(Protection::Public, "who", ArgSpec::new(), |engine, _| {
            Ok(format!("middle+{}", engine.call(["chain"])?).into())
        })
        .reveal();
    engine
        .build_class("Leaf")
        .reveal()
        .inherit(&["Middle"])
        .reveal()
        .method(Protection::Public, "who", ArgSpec::new(), |engine, _| {
            Ok(format!("leaf+{}", engine.chain(&[])?).into())
        })
        .reveal();

    eval(&mut engine, ["Leaf", "l"]);
    assert_eq!(eval(&mut engine, ["l", "who"]), "leaf+middle+base");
}

#[test]
fn protection_is_enforced_from_outside() {
    let mut engine = engine();
    engine
        .build_class("Vault")
        .reveal()
        .method(Protection::Private, "secret", ArgSpec::new(), returning("gold"))
        .reveal()
        .method(Protection::Protected, "hint", ArgSpec::new(), returning("shiny"))
        .reveal()
        .method(Protection::Public, "peek", ArgSpec::new(), |engine, _| engine.call(["secret"]))
        .reveal();
    engine
        .build_class("Thief")
        .reveal()
        .inherit(&["Vault"])
        .reveal()
        .method(Protection::Public, "steal", ArgSpec::new(), |engine, _| engine.call(["secret"]))
        .reveal()
        .method(Protection::Public, "guess", ArgSpec::new(), |engine, _| engine.call(["hint"]))
        .reveal();
    eval(&mut engine, ["Thief", "t"]);

    let error = engine.call(["t", "secret"]).err().unwrap();
    assert!(matches!(
        error.kind(),
        ErrorKind::ProtectionViolation { protection: "private", what: "function", .. }
    ));
    assert!(engine.call(["t", "hint"]).is_err());

    // Private members are visible to their own class, protected ones to derived classes.
    assert_eq!(eval(&mut engine, ["t", "peek"]), "gold");
    assert_eq!(eval(&mut engine, ["t", "guess"]), "shiny");
    assert!(engine.call(["t", "steal"]).is_err());
}

#[test]
fn unknown_methods_list_the_alternatives() {
    let mut engine = engine();
    engine
        .build_class("Small")
        .reveal()
        .method(Protection::Public, "run", ArgSpec::new(), returning(""))
        .reveal()
        .method(Protection::Private, "hidden", ArgSpec::new(), returning(""))
        .reveal();
    eval(&mut engine, ["Small", "s"]);

    let error = engine.call(["s", "fly"]).err().unwrap();
    assert_eq!(
        error.to_string(),
        "unknown subcommand \"fly\": must be cget, configure, info, isa, or run"
    );
}
