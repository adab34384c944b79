#![cfg(not(target_arch = "wasm32"))]

use ligule::{component, fragment, h, slot, text, Component, Dom, MemoryHost, Node};
use std::{cell::RefCell, rc::Rc};

fn samples(counter: &Component) -> Vec<Node> {
	vec![
		text("x"),
		h("div").into(),
		h("div").key("a").into(),
		fragment([text("p")]),
		component(counter).into(),
		slot([text("default")]),
	]
}

#[test]
fn equality_is_reflexive_and_variant_gated() {
	let counter = Component::builder("Counter").build();
	let nodes = samples(&counter);
	for (i, a) in nodes.iter().enumerate() {
		assert!(a.equals(a), "{:?}", a);
		for (j, b) in nodes.iter().enumerate() {
			if i != j && a.variant_name() != b.variant_name() {
				assert!(!a.equals(b), "{:?} == {:?}", a, b);
			}
		}
	}
}

#[test]
fn text_and_fragment_equality_ignore_content() {
	assert!(text("x").equals(&text("y")));
	assert!(fragment([h("p")]).equals(&fragment([text("q"), text("r")])));
	assert!(fragment(Vec::<Node>::new()).equals(&fragment([h("p")])));
}

#[test]
fn element_equality_is_tag_and_key() {
	let div = |key: Option<&str>| -> Node {
		let element = h("div").attr("id", "ignored").child("ignored too");
		match key {
			Some(key) => element.key(key).into(),
			None => element.into(),
		}
	};
	assert!(div(None).equals(&h("div").into()));
	assert!(div(Some("a")).equals(&h("div").key("a").into()));
	assert!(!div(Some("a")).equals(&div(Some("b"))));
	assert!(!div(Some("a")).equals(&div(None)));
	assert!(!div(None).equals(&h("span").into()));
}

#[test]
fn component_equality_is_definition_and_key() {
	let a = Component::builder("Same").build();
	let b = Component::builder("Same").build();
	let node = |component: &Component, key: &str| -> Node { ligule::component(component).key(key).prop("ignored", 1).into() };

	assert!(node(&a, "0").equals(&node(&a.clone(), "0")));
	assert!(!node(&a, "0").equals(&node(&b, "0")));
	assert!(!node(&a, "0").equals(&node(&a, "1")));
}

#[test]
fn flat_children_dissolve_fragments_only() {
	let tree: Node = h("ul")
		.child(text("a"))
		.child(fragment([fragment([text("b")]), text("c")]))
		.child(h("li").child(fragment([text("nested")])))
		.into();
	let flat = tree.flat_children();
	assert_eq!(flat.len(), 4);
	assert!(matches!(flat[0], Node::Text(t) if t.value == "a"));
	assert!(matches!(flat[1], Node::Text(t) if t.value == "b"));
	assert!(matches!(flat[2], Node::Text(t) if t.value == "c"));
	assert!(matches!(flat[3], Node::Element(element) if element.tag == "li" && element.children.len() == 1));
}

#[test]
fn clones_are_never_live() {
	let host = Rc::new(RefCell::new(MemoryHost::new()));
	let root = host.borrow().root();
	let dom = Dom::new(host.clone());

	let mut tree: Node = h("div").child("x").into();
	assert!(!tree.is_live());
	dom.mount(&mut tree, root, None).unwrap();
	assert!(tree.is_live());
	assert_eq!(tree.unit_count(), 1);

	let copy = tree.clone();
	assert!(!copy.is_live());
	assert!(copy.units().is_empty());
	assert!(copy.children().iter().all(|child| !child.is_live()));

	dom.destroy(&mut tree).unwrap();
	assert!(!tree.is_live());
	assert!(tree.children().iter().all(|child| !child.is_live()));
}
