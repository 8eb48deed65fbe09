//! Tests around `configure`, `cget` and options.

use heritage::{
    ArgSpec, ClassKind, ComponentSpec, DelegationSpec, Error, ErrorKind, OptionSpec, Protection,
    Value,
};

use super::{engine, eval, RevealResultExt};

#[test]
fn public_variables_are_configurable() {
    let mut engine = engine();
    engine
        .build_class("Server")
        .reveal()
        .variable(Protection::Public, "host", Some("localhost"))
        .reveal()
        .variable(Protection::Public, "user", None)
        .reveal()
        .variable(Protection::Private, "secret", Some("hunter2"))
        .reveal();
    eval(&mut engine, ["Server", "s"]);

    assert_eq!(eval(&mut engine, ["s", "cget", "-host"]), "localhost");
    assert_eq!(eval(&mut engine, ["s", "cget", "-user"]), "<undefined>");
    eval(&mut engine, ["s", "configure", "-host", "example.com", "-user", "root"]);
    assert_eq!(eval(&mut engine, ["s", "cget", "-host"]), "example.com");
    assert_eq!(eval(&mut engine, ["s", "cget", "-user"]), "root");

    let error = engine.call(["s", "cget", "-secret"]).err().unwrap();
    assert_eq!(error.kind(), &ErrorKind::UnknownOption { name: String::from("-secret") });
    let error = engine.call(["s", "configure", "-secret", "x"]).err().unwrap();
    assert!(matches!(error.kind(), ErrorKind::UnknownOption { .. }));
}

#[test]
fn configuration_can_be_listed() {
    let mut engine = engine();
    engine
        .build_class("Single")
        .reveal()
        .variable(Protection::Public, "x", Some("1"))
        .reveal();
    eval(&mut engine, ["Single", "one"]);

    assert_eq!(eval(&mut engine, ["one", "configure"]), "{-x 1 1}");
    assert_eq!(eval(&mut engine, ["one", "configure", "-x"]), "-x 1 1");
    eval(&mut engine, ["one", "configure", "-x", "5"]);
    assert_eq!(eval(&mut engine, ["one", "configure", "-x"]), "-x 1 5");
}

#[test]
fn configuration_code_failures_restore_the_old_value() {
    let mut engine = engine();
    engine
        .build_class("Listener")
        .reveal()
        .variable_with_config("port", Some("80"), |engine, _| {
            match engine.var("port")?.as_str().parse::<u16>() {
                Ok(_) => Ok(Value::empty()),
                Err(_) => Err(Error::user("port must be a number")),
            }
        })
        .reveal();
    eval(&mut engine, ["Listener", "l"]);

    eval(&mut engine, ["l", "configure", "-port", "8080"]);
    assert_eq!(eval(&mut engine, ["l", "cget", "-port"]), "8080");

    let error = engine.call(["l", "configure", "-port", "http"]).err().unwrap();
    assert_eq!(error.to_string(), "port must be a number");
    assert!(error
        .error_info()
        .iter()
        .any(|line| line == "(error in configuration of public variable \"::Listener::port\")"));
    assert_eq!(eval(&mut engine, ["l", "cget", "-port"]), "8080");
}

#[test]
fn options_have_defaults_and_can_be_set_at_creation() {
    let mut engine = engine();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Box")
        .reveal()
        .option(OptionSpec::new("-size").default("10"))
        .reveal()
        .option(OptionSpec::new("-color").resource("tint").class_name("Tint"))
        .reveal();

    eval(&mut engine, ["Box", "small"]);
    assert_eq!(eval(&mut engine, ["small", "cget", "-size"]), "10");
    assert_eq!(eval(&mut engine, ["small", "configure", "-size"]), "-size size Size 10 10");
    assert_eq!(eval(&mut engine, ["small", "configure", "-color"]), "-color tint Tint {} {}");

    eval(&mut engine, ["Box", "big", "-size", "99", "-color", "red"]);
    assert_eq!(eval(&mut engine, ["big", "cget", "-size"]), "99");
    assert_eq!(eval(&mut engine, ["big", "cget", "-color"]), "red");

    assert_eq!(eval(&mut engine, ["big", "info", "option", "-size"]), "-size size Size 10 99");
    let listed = eval(&mut engine, ["big", "info", "option"]);
    let mut listed: Vec<&str> = listed.split(' ').collect();
    listed.sort_unstable();
    assert_eq!(listed, ["-color", "-size"]);
}

#[test]
fn the_most_specific_default_wins() {
    let mut engine = engine();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Shape")
        .reveal()
        .option(OptionSpec::new("-sides").default("0"))
        .reveal();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Square")
        .reveal()
        .inherit(&["Shape"])
        .reveal()
        .option(OptionSpec::new("-sides").default("4"))
        .reveal();

    eval(&mut engine, ["Square", "sq"]);
    assert_eq!(eval(&mut engine, ["sq", "cget", "-sides"]), "4");
    eval(&mut engine, ["Shape", "blob"]);
    assert_eq!(eval(&mut engine, ["blob", "cget", "-sides"]), "0");
}

#[test]
fn readonly_options_are_only_set_during_creation() {
    let mut engine = engine();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Ticket")
        .reveal()
        .option(OptionSpec::new("-id").readonly())
        .reveal();
    eval(&mut engine, ["Ticket", "t", "-id", "7"]);

    let error = engine.call(["t", "configure", "-id", "8"]).err().unwrap();
    assert!(matches!(
        error.kind(),
        ErrorKind::ProtectionViolation { protection: "readonly", what: "option", .. }
    ));
    assert_eq!(eval(&mut engine, ["t", "cget", "-id"]), "7");
}

#[test]
fn validation_methods_can_reject_values() {
    let mut engine = engine();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Gauge")
        .reveal()
        .option(OptionSpec::new("-level").default("0").validate_method("check"))
        .reveal()
        .method(Protection::Private, "check", ArgSpec::parse("option value"), |engine, _| {
            let (option, value) = (engine.var("option")?, engine.var("value")?);
            match value.as_str().parse::<i64>() {
                Ok(level) if (0..=10).contains(&level) => Ok(Value::empty()),
                _ => Err(Error::user(format!("bad value \"{value}\" for {option}"))),
            }
        })
        .reveal();
    eval(&mut engine, ["Gauge", "g"]);

    eval(&mut engine, ["g", "configure", "-level", "3"]);
    assert_eq!(eval(&mut engine, ["g", "cget", "-level"]), "3");
    let error = engine.call(["g", "configure", "-level", "11"]).err().unwrap();
    assert_eq!(error.to_string(), "bad value \"11\" for -level");
    assert_eq!(eval(&mut engine, ["g", "cget", "-level"]), "3");
}

#[test]
fn option_methods_replace_storage() {
    let mut engine = engine();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Thermostat")
        .reveal()
        .variable(Protection::Private, "celsius", Some("20"))
        .reveal()
        .option(
            OptionSpec::new("-fahrenheit")
                .configure_method("set_fahrenheit")
                .cget_method("get_fahrenheit"),
        )
        .reveal()
        .method(
            Protection::Private,
            "set_fahrenheit",
            ArgSpec::parse("option value"),
            |engine, _| {
                let f: i64 = engine.var("value")?.as_str().parse().unwrap_or(32);
                engine.set_var("celsius", (f - 32) * 5 / 9)
            },
        )
        .reveal()
        .method(Protection::Private, "get_fahrenheit", ArgSpec::parse("option"), |engine, _| {
            let c: i64 = engine.var("celsius")?.as_str().parse().unwrap_or(0);
            Ok(Value::from(c * 9 / 5 + 32))
        })
        .reveal()
        .method(Protection::Public, "celsius", ArgSpec::new(), |engine, _| engine.var("celsius"))
        .reveal();
    eval(&mut engine, ["Thermostat", "t"]);

    assert_eq!(eval(&mut engine, ["t", "cget", "-fahrenheit"]), "68");
    eval(&mut engine, ["t", "configure", "-fahrenheit", "212"]);
    assert_eq!(eval(&mut engine, ["t", "celsius"]), "100");
    assert_eq!(eval(&mut engine, ["t", "cget", "-fahrenheit"]), "212");
}

#[test]
fn configure_method_variables_are_read_every_time() {
    let mut engine = engine();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Switch")
        .reveal()
        .variable(Protection::Private, "handler", Some(""))
        .reveal()
        .variable(Protection::Private, "seen", Some(""))
        .reveal()
        .option(OptionSpec::new("-state").default("off").configure_method_var("handler"))
        .reveal()
        .method(Protection::Private, "record", ArgSpec::parse("option value"), |engine, _| {
            let value = engine.var("value")?;
            engine.set_var("seen", value)
        })
        .reveal()
        .method(Protection::Public, "use", ArgSpec::parse("method"), |engine, _| {
            let method = engine.var("method")?;
            engine.set_var("handler", method)
        })
        .reveal()
        .method(Protection::Public, "seen", ArgSpec::new(), |engine, _| engine.var("seen"))
        .reveal();
    eval(&mut engine, ["Switch", "s"]);

    eval(&mut engine, ["s", "configure", "-state", "on"]);
    assert_eq!(eval(&mut engine, ["s", "cget", "-state"]), "on");
    assert_eq!(eval(&mut engine, ["s", "seen"]), "");

    eval(&mut engine, ["s", "use", "record"]);
    eval(&mut engine, ["s", "configure", "-state", "off"]);
    assert_eq!(eval(&mut engine, ["s", "seen"]), "off");
    assert_eq!(eval(&mut engine, ["s", "cget", "-state"]), "on");
}

#[test]
fn options_can_be_delegated() {
    let mut engine = engine();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Inner")
        .reveal()
        .option(OptionSpec::new("-color").default("red"))
        .reveal();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Outer")
        .reveal()
        .option(OptionSpec::new("-width").default("1"))
        .reveal()
        .component("inner", ComponentSpec::default())
        .reveal()
        .delegate_option(DelegationSpec::new("-color").to("inner"))
        .reveal()
        .delegate_option(DelegationSpec::new("-shade").to("inner").as_target("-color"))
        .reveal()
        .constructor("args", |engine, _| {
            let inner = engine.call(["Inner", "::inner0"])?;
            engine.set_var("inner", inner)?;
            let mut argv = vec![engine.this()?, Value::from("configure")];
            argv.extend(engine.var("args")?.to_list());
            if argv.len() > 2 {
                engine.invoke(&argv)?;
            }
            Ok(Value::empty())
        })
        .reveal();
    eval(&mut engine, ["Outer", "o", "-color", "green"]);

    assert_eq!(eval(&mut engine, ["o", "cget", "-color"]), "green");
    assert_eq!(eval(&mut engine, ["::inner0", "cget", "-color"]), "green");
    eval(&mut engine, ["o", "configure", "-shade", "blue"]);
    assert_eq!(eval(&mut engine, ["::inner0", "cget", "-color"]), "blue");
    assert_eq!(eval(&mut engine, ["o", "configure", "-shade"]), "-shade color Color red blue");

    let listed = eval(&mut engine, ["o", "configure"]);
    assert!(listed.starts_with("{-width width Width 1 1}"));
    assert!(listed.contains("{-color color Color red blue}"));

    let delegated = eval(&mut engine, ["o", "info", "delegated", "option"]);
    assert!(delegated.contains("{-shade inner}"));
}

#[test]
fn pairs_must_be_complete() {
    let mut engine = engine();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Pair")
        .reveal()
        .option(OptionSpec::new("-a"))
        .reveal()
        .option(OptionSpec::new("-b"))
        .reveal();
    eval(&mut engine, ["Pair", "p"]);

    let error = engine.call(["p", "configure", "-a", "1", "-b"]).err().unwrap();
    assert_eq!(error.kind(), &ErrorKind::BadSyntax(String::from("value for \"-b\" missing")));
    let error = engine.call(["p", "cget"]).err().unwrap();
    assert_eq!(error.to_string(), "wrong # args: should be \"p cget option\"");
}

#[test]
fn setget_reads_and_writes() {
    let mut engine = engine();
    engine
        .build_class_of_kind(ClassKind::ExtendedClass, "Knob")
        .reveal()
        .option(OptionSpec::new("-value").default("0"))
        .reveal();
    engine.build_class("Plain").reveal();
    eval(&mut engine, ["Knob", "k"]);
    eval(&mut engine, ["Plain", "p"]);

    assert_eq!(eval(&mut engine, ["k", "setget", "-value"]), "0");
    assert_eq!(eval(&mut engine, ["k", "setget", "-value", "11"]), "11");
    assert_eq!(eval(&mut engine, ["k", "cget", "-value"]), "11");

    let error = engine.call(["p", "setget", "-value"]).err().unwrap();
    assert!(matches!(error.kind(), ErrorKind::UnknownSubcommand { .. }));
}
