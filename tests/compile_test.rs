//! Template compilation and rendering

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use weft::{Bindings, Engine, MockSource, PromptTemplate, WeftError};

fn engine_with(fragments: &[&str]) -> (Arc<MockSource>, Arc<Engine>) {
    let source = MockSource::new(fragments.to_vec());
    let engine = Engine::new(Arc::clone(&source) as _);
    (source, engine)
}

// ─────────────────────────────────────────────────────────────
// Literal-only templates
// ─────────────────────────────────────────────────────────────

#[test]
fn literal_only_template_renders_exactly() {
    let (source, engine) = engine_with(&["never used"]);
    let template = PromptTemplate::parse("Snap, crackle, and pop.");
    let instance = template.instantiate(&Bindings::new(), &engine).unwrap();

    assert_eq!(instance.render(), "Snap, crackle, and pop.");
    assert_eq!(instance.progress(), (0, 0));
    assert_eq!(instance.entrypoint(), None);
    assert_eq!(instance.exitpoint(), None);
    // No holes means no generation activity at all
    assert_eq!(source.calls(), 0);
}

#[test]
fn escapes_resolve_in_rendered_output() {
    let (source, engine) = engine_with(&[]);
    let template =
        PromptTemplate::parse(r"Escaped \[brackets\] and \{braces\}, plus a \\ backslash");
    let instance = template.instantiate(&Bindings::new(), &engine).unwrap();

    assert_eq!(
        instance.render(),
        r"Escaped [brackets] and {braces}, plus a \ backslash"
    );
    assert_eq!(source.calls(), 0);
}

// ─────────────────────────────────────────────────────────────
// Variable resolution
// ─────────────────────────────────────────────────────────────

#[test]
fn variables_substitute_bound_values() {
    let (_, engine) = engine_with(&[]);
    let template = PromptTemplate::parse("{x} is not {y}.");
    let bindings = Bindings::new().bind("x", "loam").bind("y", 5i64);
    let instance = template.instantiate(&bindings, &engine).unwrap();

    assert_eq!(instance.render(), "loam is not 5.");
}

#[test]
fn dotted_paths_traverse_objects_and_arrays() {
    let (_, engine) = engine_with(&[]);
    let template = PromptTemplate::parse("Depart at {flight.departure} from {gates.0}.");
    let bindings = Bindings::new()
        .bind("flight", json!({"departure": "10:30"}))
        .bind("gates", json!(["A12", "B3"]));
    let instance = template.instantiate(&bindings, &engine).unwrap();

    assert_eq!(instance.render(), "Depart at 10:30 from A12.");
}

#[test]
fn undeclared_variable_fails_before_any_generation() {
    let (source, engine) = engine_with(&["never"]);
    let template = PromptTemplate::parse("A {missing} thing with a [hole].");
    let err = template
        .instantiate(&Bindings::new(), &engine)
        .unwrap_err();

    assert!(matches!(err, WeftError::UndeclaredSymbol { name } if name == "missing"));
    assert_eq!(source.calls(), 0);
}

#[test]
fn dotted_path_with_unbound_root_fails() {
    let (_, engine) = engine_with(&[]);
    let template = PromptTemplate::parse("{ghost.field}");
    let err = template
        .instantiate(&Bindings::new(), &engine)
        .unwrap_err();
    assert!(matches!(err, WeftError::UndeclaredSymbol { name } if name == "ghost"));
}

#[test]
fn missing_field_and_null_values_fail_compilation() {
    let (_, engine) = engine_with(&[]);

    let template = PromptTemplate::parse("{data.absent}");
    let bindings = Bindings::new().bind("data", json!({"present": 1}));
    assert!(matches!(
        template.instantiate(&bindings, &engine).unwrap_err(),
        WeftError::PathNotFound { .. }
    ));

    let template = PromptTemplate::parse("{data.value}");
    let bindings = Bindings::new().bind("data", json!({"value": null}));
    assert!(matches!(
        template.instantiate(&bindings, &engine).unwrap_err(),
        WeftError::NullValue { .. }
    ));
}

#[test]
fn traversal_into_primitive_fails_compilation() {
    let (_, engine) = engine_with(&[]);
    let template = PromptTemplate::parse("{price.currency}");
    let bindings = Bindings::new().bind("price", 42i64);
    assert!(matches!(
        template.instantiate(&bindings, &engine).unwrap_err(),
        WeftError::InvalidTraversal { .. }
    ));
}

#[test]
fn empty_names_fail_at_binding_time() {
    let (_, engine) = engine_with(&[]);

    let err = PromptTemplate::parse("an {} here")
        .instantiate(&Bindings::new(), &engine)
        .unwrap_err();
    assert!(matches!(err, WeftError::EmptyVariableName { .. }));

    let err = PromptTemplate::parse("a [] there")
        .instantiate(&Bindings::new(), &engine)
        .unwrap_err();
    assert!(matches!(err, WeftError::EmptyHoleName { .. }));
}

// ─────────────────────────────────────────────────────────────
// Hole declaration
// ─────────────────────────────────────────────────────────────

#[test]
fn duplicate_hole_fails_before_any_generation() {
    let (source, engine) = engine_with(&["never"]);
    let template = PromptTemplate::parse("[a] and then [a]");
    let err = template
        .instantiate(&Bindings::new(), &engine)
        .unwrap_err();

    assert!(matches!(err, WeftError::RedeclaredHole { name } if name == "a"));
    assert_eq!(source.calls(), 0);
}

#[test]
fn hole_shadowing_a_variable_fails() {
    let (_, engine) = engine_with(&[]);
    let template = PromptTemplate::parse("[x]");
    let bindings = Bindings::new().bind("x", "already bound");
    assert!(matches!(
        template.instantiate(&bindings, &engine).unwrap_err(),
        WeftError::HoleShadowsVariable { name } if name == "x"
    ));
}

#[test]
fn invalid_hole_name_fails() {
    let (_, engine) = engine_with(&[]);
    let err = PromptTemplate::parse("[bad name]")
        .instantiate(&Bindings::new(), &engine)
        .unwrap_err();
    assert!(matches!(err, WeftError::InvalidName { .. }));
}

#[test]
fn entrypoint_and_exitpoint_follow_source_order() {
    let (_, engine) = engine_with(&["text."]);
    let template = PromptTemplate::parse("[first] then [second] then [third]");
    let instance = template
        .instantiate_deferred(&Bindings::new(), &engine)
        .unwrap();

    assert_eq!(instance.entrypoint(), Some("first"));
    assert_eq!(instance.exitpoint(), Some("third"));
    assert_eq!(instance.holes().len(), 3);
}

// ─────────────────────────────────────────────────────────────
// Stop conditions attached at compile time
// ─────────────────────────────────────────────────────────────

#[test]
fn explicit_stop_pattern_compiles_as_regex() {
    let (_, engine) = engine_with(&[]);
    let template = PromptTemplate::parse(r"One kind of animal is a [name:(\.|,)]");
    let instance = template
        .instantiate_deferred(&Bindings::new(), &engine)
        .unwrap();

    let hole = instance.completion("name").unwrap();
    assert_eq!(hole.stops(), vec![r"regex:(\.|,)".to_string()]);
}

#[test]
fn invalid_stop_pattern_fails_compilation() {
    let (_, engine) = engine_with(&[]);
    let err = PromptTemplate::parse("[x:((]")
        .instantiate(&Bindings::new(), &engine)
        .unwrap_err();
    assert!(matches!(err, WeftError::InvalidStopPattern { .. }));
}

#[test]
fn auto_stop_registers_clause_boundary_of_next_literal() {
    let (_, engine) = engine_with(&[]);
    let template = PromptTemplate::parse("A is [x]. Then [y] follows");
    let instance = template
        .instantiate_deferred(&Bindings::new(), &engine)
        .unwrap();

    // "." leads the literal after [x]
    assert_eq!(
        instance.completion("x").unwrap().stops(),
        vec!["literal:.".to_string()]
    );
    // " follows" has no boundary token
    assert!(instance.completion("y").unwrap().stops().is_empty());
}

#[test]
fn auto_stop_skips_non_literal_followers() {
    let (_, engine) = engine_with(&[]);
    let template = PromptTemplate::parse("[x]{sep}. done");
    let bindings = Bindings::new().bind("sep", " - ");
    let instance = template.instantiate_deferred(&bindings, &engine).unwrap();

    // A variable sits between the hole and the punctuation literal
    assert!(instance.completion("x").unwrap().stops().is_empty());
}

#[test]
fn auto_stop_combines_with_explicit_pattern() {
    let (_, engine) = engine_with(&[]);
    let template = PromptTemplate::parse(r"[x:STOP]. more");
    let instance = template
        .instantiate_deferred(&Bindings::new(), &engine)
        .unwrap();

    assert_eq!(
        instance.completion("x").unwrap().stops(),
        vec!["regex:STOP".to_string(), "literal:.".to_string()]
    );
}

// ─────────────────────────────────────────────────────────────
// End-to-end fills
// ─────────────────────────────────────────────────────────────

#[test]
fn two_hole_template_fills_in_order_with_auto_stops() {
    let source = MockSource::scripted(vec![vec!["dog."], vec!["pack!"]]);
    let engine = Engine::new(source);
    let template =
        PromptTemplate::parse("One kind of {x} is a [name].\n\n5 {name}s makes a [group_name].");
    let bindings = Bindings::new().bind("x", "domestic animal");
    let instance = template.instantiate(&bindings, &engine).unwrap();

    assert_eq!(instance.text("name").unwrap(), "dog");
    // "pack!" has no auto-stop match ("." only), so the full fragment stays
    assert_eq!(instance.text("group_name").unwrap(), "pack!");

    instance.wait(None).unwrap();
    assert_eq!(
        instance.render(),
        "One kind of domestic animal is a dog.\n\n5 dogs makes a pack!."
    );
    assert_eq!(instance.progress(), (2, 0));
}

#[test]
fn back_reference_feeds_successor_context() {
    let source = MockSource::scripted(vec![vec!["dog."], vec!["pack."]]);
    let engine = Engine::new(source);
    let template = PromptTemplate::parse("A {x} is a [name]. 5 {name}s make a [group].");
    let bindings = Bindings::new().bind("x", "pet");
    let instance = template.instantiate(&bindings, &engine).unwrap();
    instance.wait(None).unwrap();

    // The second hole's input context included the first hole's text
    assert_eq!(instance.render(), "A pet is a dog. 5 dogs make a pack.");
}

#[test]
fn bound_external_completion_resolves_blocking_at_compile() {
    let source = MockSource::new(["pop!"]);
    let engine = Engine::new(source);
    let who = engine.completion("Snap, crackle, and").spawn().unwrap();

    let (_, template_engine) = engine_with(&[]);
    let template = PromptTemplate::parse("The sound was {who}");
    let bindings = Bindings::new().bind("who", who);
    let instance = template.instantiate(&bindings, &template_engine).unwrap();

    assert_eq!(instance.render(), "The sound was pop!");
}

#[test]
fn nested_instance_resolves_through_attribute_path() {
    let inner_source = MockSource::new(["quiet."]);
    let inner_engine = Engine::new(inner_source);
    let inner = PromptTemplate::parse("The library is [mood]. always")
        .instantiate(&Bindings::new(), &inner_engine)
        .unwrap();

    let (_, outer_engine) = engine_with(&[]);
    let outer = PromptTemplate::parse("Report: {report.mood}");
    let bindings = Bindings::new().bind("report", inner);
    let instance = outer.instantiate(&bindings, &outer_engine).unwrap();

    assert_eq!(instance.render(), "Report: quiet");
}

#[test]
fn nested_instance_without_path_renders_whole_text() {
    let inner_source = MockSource::new(["calm."]);
    let inner_engine = Engine::new(inner_source);
    let inner = PromptTemplate::parse("All [state]. here")
        .instantiate(&Bindings::new(), &inner_engine)
        .unwrap();

    let (_, outer_engine) = engine_with(&[]);
    let outer = PromptTemplate::parse("Summary: {report}");
    let bindings = Bindings::new().bind("report", inner);
    let instance = outer.instantiate(&bindings, &outer_engine).unwrap();

    assert_eq!(instance.render(), "Summary: All calm. here");
}

#[test]
fn text_resolves_bound_json_values_too() {
    let (_, engine) = engine_with(&[]);
    let template = PromptTemplate::parse("{x} stays");
    let bindings = Bindings::new().bind("x", "bound");
    let instance = template.instantiate(&bindings, &engine).unwrap();

    assert_eq!(instance.text("x").unwrap(), "bound");
    assert!(matches!(
        instance.text("nope").unwrap_err(),
        WeftError::UndeclaredSymbol { .. }
    ));
}
