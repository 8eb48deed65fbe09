//! Tests around components and delegation.

use heritage::{
    ArgSpec, ClassKind, ComponentSpec, DelegationSpec, Dispatch, Engine, Error, ErrorKind,
    OptionSpec, Protection, Value,
};

use super::{engine, eval, RevealResultExt};

fn returning(value: &'static str) -> impl Fn(&mut Engine, &[Value]) -> Result<Value, Error> {
    move |_, _| Ok(Value::from(value))
}

fn tail(engine: &mut Engine) {
    engine
        .build_class("Tail")
        .reveal()
        .method(Protection::Public, "foo", ArgSpec::new(), returning("foo"))
        .reveal()
        .method(Protection::Public, "bar", ArgSpec::new(), returning("bar"))
        .reveal()
        .method(Protection::Public, "baz", ArgSpec::new(), returning("baz"))
        .reveal()
        .method(Protection::Public, "wag", ArgSpec::parse("times"), |engine, _| {
            Ok(format!("wagged {} times", engine.var("times")?).into())
        })
        .reveal();
}

/// A dog with a tail that handles everything except `foo` and `bar`.
fn dog(engine: &mut Engine) {
    tail(engine);
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Dog")
        .reveal()
        .component("tail", ComponentSpec::default())
        .reveal()
        .delegate_method(DelegationSpec::new("*").to("tail").except(["foo", "bar"]))
        .reveal()
        .delegate_method(DelegationSpec::new("shake").to("tail").as_target("wag 3"))
        .reveal()
        .constructor("", |engine, _| {
            let tail = engine.call(["Tail", "::dogtail"])?;
            engine.set_var("tail", tail)
        })
        .reveal();
}

#[test]
fn wildcard_delegation_forwards_everything_not_excluded() {
    let mut engine = engine();
    dog(&mut engine);
    eval(&mut engine, ["Dog", "d"]);

    assert_eq!(eval(&mut engine, ["d", "baz"]), "baz");

    let error = engine.call(["d", "foo"]).err().unwrap();
    let ErrorKind::UnknownSubcommand { name, candidates } = error.kind() else {
        panic!("unexpected error: {error}");
    };
    assert_eq!(name, "foo");
    assert!(candidates.iter().any(|c| c == "baz"));
    assert!(!candidates.iter().any(|c| c == "foo" || c == "bar"));
}

#[test]
fn delegated_methods_can_be_renamed() {
    let mut engine = engine();
    dog(&mut engine);
    eval(&mut engine, ["Dog", "d"]);

    assert_eq!(eval(&mut engine, ["d", "shake"]), "wagged 3 times");
}

#[test]
fn usage_errors_name_the_delegating_object() {
    let mut engine = engine();
    dog(&mut engine);
    eval(&mut engine, ["Dog", "d"]);

    let error = engine.call(["d", "wag"]).err().unwrap();
    assert_eq!(error.to_string(), "wrong # args: should be \"d wag times\"");
    assert_eq!(eval(&mut engine, ["d", "wag", "2"]), "wagged 2 times");
}

#[test]
fn empty_components_are_reported() {
    let mut engine = engine();
    tail(&mut engine);
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Stray")
        .reveal()
        .component("tail", ComponentSpec::default())
        .reveal()
        .delegate_method(DelegationSpec::new("*").to("tail"))
        .reveal();
    eval(&mut engine, ["Stray", "s"]);

    let error = engine.call(["s", "baz"]).err().unwrap();
    assert!(matches!(error.kind(), ErrorKind::ComponentNotInitialized { .. }));
    assert_eq!(error.to_string(), "component \"tail\" is not initialized in object \"::s\"");
}

#[test]
fn delegations_need_a_known_component() {
    let mut engine = engine();
    let result = engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Lonely")
        .and_then(|class| class.delegate_method(DelegationSpec::new("run").to("nobody")));
    assert!(matches!(result.err().unwrap().kind(), ErrorKind::NotFound { what: "component", .. }));

    let result = engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Confused")
        .and_then(|class| class.component("helper", ComponentSpec::default()))
        .and_then(|class| {
            class.delegate_method(DelegationSpec::new("*").to("helper").as_target("run"))
        });
    assert!(matches!(result.err().unwrap().kind(), ErrorKind::BadSyntax(_)));

    let result = engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Picky")
        .and_then(|class| class.component("helper", ComponentSpec::default()))
        .and_then(|class| {
            class.delegate_method(DelegationSpec::new("run").to("helper").except(["walk"]))
        });
    assert!(matches!(result.err().unwrap().kind(), ErrorKind::BadSyntax(_)));
}

#[test]
fn using_patterns_build_the_forwarded_command() {
    let mut engine = engine();
    engine.add_function("::describer", |_, args| {
        let words: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        Ok(Value::from(words.join("|")))
    });
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Logger")
        .reveal()
        .delegate_method(DelegationSpec::new("log").using("::describer %s %n %m %t"))
        .reveal();
    eval(&mut engine, ["Logger", "l"]);

    assert_eq!(eval(&mut engine, ["l", "log", "hello"]), "::l|l|log|::Logger|hello");
}

#[test]
fn inherited_components_receive_everything_unhandled() {
    let mut engine = engine();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Engine")
        .reveal()
        .option(OptionSpec::new("-power").default("100"))
        .reveal()
        .method(Protection::Public, "start", ArgSpec::new(), returning("vroom"))
        .reveal();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Car")
        .reveal()
        .component("motor", ComponentSpec { inherit: true, ..Default::default() })
        .reveal()
        .method(Protection::Public, "honk", ArgSpec::new(), returning("beep"))
        .reveal()
        .constructor("", |engine, _| {
            let motor = engine.call(["Engine", "::motor0"])?;
            engine.set_var("motor", motor)
        })
        .reveal();
    eval(&mut engine, ["Car", "car"]);

    assert_eq!(eval(&mut engine, ["car", "honk"]), "beep");
    assert_eq!(eval(&mut engine, ["car", "start"]), "vroom");
    assert_eq!(eval(&mut engine, ["car", "cget", "-power"]), "100");
    eval(&mut engine, ["car", "configure", "-power", "250"]);
    assert_eq!(eval(&mut engine, ["::motor0", "cget", "-power"]), "250");
    assert_eq!(eval(&mut engine, ["car", "info", "component", "motor"]), "::motor0");
}

#[test]
fn procs_can_be_delegated_to_common_components() {
    let mut engine = engine();
    engine.add_function("::backing", |_, args| {
        Ok(format!("backing {}", Value::list(args.iter().cloned())).into())
    });
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Registry")
        .reveal()
        .component("store", ComponentSpec { common: true, ..Default::default() })
        .reveal()
        .delegate_proc(DelegationSpec::new("lookup").to("store"))
        .reveal();
    engine.set_var("::Registry::store", "::backing").reveal();

    assert_eq!(eval(&mut engine, ["Registry", "lookup", "key"]), "backing lookup key");

    let result = engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Private")
        .and_then(|class| class.component("store", ComponentSpec::default()))
        .and_then(|class| class.delegate_proc(DelegationSpec::new("lookup").to("store")));
    assert!(matches!(result.err().unwrap().kind(), ErrorKind::BadSyntax(_)));
}

#[test]
fn wildcard_resolutions_are_remembered() {
    let mut engine = engine();
    dog(&mut engine);
    eval(&mut engine, ["Dog", "d"]);
    let d = engine.lookup_object("d").unwrap();
    let argv = [Value::from("d"), Value::from("baz")];

    let Dispatch::ForwardToComponent(forward) = engine.resolve_object_call(d, &argv).reveal()
    else {
        panic!("baz should be forwarded");
    };
    assert!(forward.memoize.is_some());
    assert_eq!(forward.argv, [Value::from("::dogtail"), Value::from("baz")]);

    assert_eq!(eval(&mut engine, ["d", "baz"]), "baz");
    let Dispatch::ForwardToComponent(forward) = engine.resolve_object_call(d, &argv).reveal()
    else {
        panic!("baz should still be forwarded");
    };
    assert!(forward.memoize.is_none());

    // Redefining the class forgets what was remembered.
    engine
        .class_builder("Dog")
        .reveal()
        .method(Protection::Public, "bark", ArgSpec::new(), returning("woof"))
        .reveal();
    let Dispatch::ForwardToComponent(forward) = engine.resolve_object_call(d, &argv).reveal()
    else {
        panic!("baz should be forwarded after redefinition");
    };
    assert!(forward.memoize.is_some());
}

#[test]
fn remembered_methods_do_not_leak_into_class_calls() {
    let mut engine = engine();
    dog(&mut engine);
    eval(&mut engine, ["Dog", "d"]);
    assert_eq!(eval(&mut engine, ["d", "baz"]), "baz");

    let class = engine.find_class("Dog").reveal();
    let argv = [Value::from("Dog"), Value::from("baz")];
    let dispatch = engine.resolve_class_call(class, &argv).reveal();
    let Dispatch::CreateInstance { name, args, .. } = dispatch else {
        panic!("unexpected dispatch: {dispatch:?}");
    };
    assert_eq!(name, Value::from("baz"));
    assert!(args.is_empty());

    // The first dog's tail is in the way of the second one's constructor.
    engine.delete_object("::dogtail").reveal();
    assert_eq!(eval(&mut engine, ["Dog", "baz"]), "baz");
    assert!(engine.is_object("baz", Some("Dog")));
}

/// A kennel forwards unknown methods to its tail and unknown procs to a shared keeper.
fn kennel(engine: &mut Engine) {
    tail(engine);
    engine.add_function("::keeper", |_, args| {
        Ok(format!("keeper {}", Value::list(args.iter().cloned())).into())
    });
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Kennel")
        .reveal()
        .component("tail", ComponentSpec::default())
        .reveal()
        .component("keeper", ComponentSpec { common: true, ..Default::default() })
        .reveal()
        .delegate_method(DelegationSpec::new("*").to("tail"))
        .reveal()
        .delegate_proc(DelegationSpec::new("*").to("keeper"))
        .reveal()
        .constructor("", |engine, _| {
            let tail = engine.call(["Tail", "::kenneltail"])?;
            engine.set_var("tail", tail)
        })
        .reveal();
    engine.set_var("::Kennel::keeper", "::keeper").reveal();
}

#[test]
fn methods_and_procs_delegate_independently() {
    let mut engine = engine();
    kennel(&mut engine);
    eval(&mut engine, ["Kennel", "create", "k"]);

    assert_eq!(eval(&mut engine, ["Kennel", "count"]), "keeper count");
    assert_eq!(eval(&mut engine, ["k", "baz"]), "baz");
    assert_eq!(eval(&mut engine, ["Kennel", "baz"]), "keeper baz");
    assert!(!engine.is_object("baz", None));

    // `count` was only ever resolved as a proc; the tail has no such method.
    assert!(engine.call(["k", "count"]).is_err());
    assert_eq!(eval(&mut engine, ["Kennel", "count"]), "keeper count");
}

#[test]
fn same_named_method_and_proc_delegations_coexist() {
    let mut engine = engine();
    kennel(&mut engine);
    engine
        .class_builder("Kennel")
        .reveal()
        .delegate_method(DelegationSpec::new("report").to("tail").as_target("wag 2"))
        .reveal()
        .delegate_proc(DelegationSpec::new("report").to("keeper"))
        .reveal();
    eval(&mut engine, ["Kennel", "create", "k"]);

    assert_eq!(eval(&mut engine, ["k", "report"]), "wagged 2 times");
    assert_eq!(eval(&mut engine, ["Kennel", "report"]), "keeper report");

    let result = engine
        .class_builder("Kennel")
        .and_then(|class| class.delegate_proc(DelegationSpec::new("report").to("keeper")));
    assert!(matches!(
        result.err().unwrap().kind(),
        ErrorKind::DuplicateDefinition { what: "delegated proc", .. }
    ));
}

#[test]
fn class_calls_reach_common_inherited_components() {
    let mut engine = engine();
    engine.add_function("::registry", |_, args| {
        Ok(format!("registry {}", Value::list(args.iter().cloned())).into())
    });
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Front")
        .reveal()
        .component("store", ComponentSpec { inherit: true, common: true, ..Default::default() })
        .reveal();

    // Until the component is set, unknown words still name new objects.
    assert_eq!(eval(&mut engine, ["Front", "early"]), "early");
    assert!(engine.is_object("early", Some("Front")));

    engine.set_var("::Front::store", "::registry").reveal();
    assert_eq!(eval(&mut engine, ["Front", "lookup", "key"]), "registry lookup key");
    assert!(!engine.is_object("lookup", None));

    assert_eq!(eval(&mut engine, ["Front", "create", "f"]), "f");
    assert_eq!(eval(&mut engine, ["f", "lookup", "key"]), "registry lookup key");
}

#[test]
fn info_lists_delegations() {
    let mut engine = engine();
    dog(&mut engine);
    eval(&mut engine, ["Dog", "d"]);

    let delegated = eval(&mut engine, ["d", "info", "delegated", "method"]);
    assert!(delegated.contains("{* tail}"));
    assert!(delegated.contains("{shake tail}"));
    assert_eq!(eval(&mut engine, ["d", "info", "component"]), "tail");
    assert_eq!(eval(&mut engine, ["d", "info", "component", "tail"]), "::dogtail");
}
