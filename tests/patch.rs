#![cfg(not(target_arch = "wasm32"))]

use ligule::{fragment, h, slot, text, Dom, DomOptions, Error, Handler, MemoryHost, Node, Unit};
use std::{cell::RefCell, rc::Rc};

fn setup() -> (Rc<RefCell<MemoryHost>>, Dom, Unit) {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	let host = Rc::new(RefCell::new(MemoryHost::new()));
	let root = host.borrow().root();
	let dom = Dom::new(host.clone());
	(host, dom, root)
}

#[test]
fn text_update_keeps_the_element() {
	let (host, dom, root) = setup();

	let mut old: Node = h("p").child("Hello").into();
	dom.mount(&mut old, root, None).unwrap();
	let p = old.first_unit().unwrap();
	let text_unit = host.borrow().children(p)[0];

	let before = host.borrow().mutations();
	let new = dom.patch(old, h("p").child("Hi").into(), root).unwrap();

	assert_eq!(new.first_unit(), Some(p));
	assert_eq!(host.borrow().children(p).to_vec(), vec![text_unit]);
	assert_eq!(host.borrow().text(text_unit), Some("Hi"));
	assert_eq!(host.borrow().mutations() - before, 1);
}

#[test]
fn attribute_and_class_diff() {
	let (host, dom, root) = setup();

	let mut old: Node = h("div").attr("id", "abc").attr("class", "foo").attr("title", "same").attr("hidden", "").into();
	dom.mount(&mut old, root, None).unwrap();
	let div = old.first_unit().unwrap();

	let before = host.borrow().mutations();
	let new = dom.patch(old, h("div").attr("id", "def").attr("class", "bar").attr("title", "same").into(), root).unwrap();

	let host = host.borrow();
	assert_eq!(new.first_unit(), Some(div));
	assert_eq!(host.attribute(div, "id"), Some("def"));
	assert_eq!(host.attribute(div, "title"), Some("same"));
	assert_eq!(host.attribute(div, "hidden"), None);
	assert_eq!(host.classes(div), ["bar"]);
	// id, hidden, foo, bar
	assert_eq!(host.mutations() - before, 4);
}

#[test]
fn classes_are_diffed_as_sets() {
	let (host, dom, root) = setup();

	let mut old: Node = h("div").class("a b c").into();
	dom.mount(&mut old, root, None).unwrap();
	let before = host.borrow().mutations();
	let new = dom.patch(old, h("div").class("c a").into(), root).unwrap();

	assert_eq!(host.borrow().mutations() - before, 1);
	assert_eq!(host.borrow().classes(new.first_unit().unwrap()), ["a", "c"]);
}

#[test]
fn styles_are_diffed_per_property() {
	let (host, dom, root) = setup();

	let mut old: Node = h("div").style("color", "red").style("margin", "0").into();
	dom.mount(&mut old, root, None).unwrap();
	let new = dom.patch(old, h("div").style("color", "blue").style("padding", "1px").into(), root).unwrap();

	let div = new.first_unit().unwrap();
	let host = host.borrow();
	assert_eq!(host.style(div, "color"), Some("blue"));
	assert_eq!(host.style(div, "margin"), None);
	assert_eq!(host.style(div, "padding"), Some("1px"));
}

#[test]
fn second_identical_patch_is_a_noop() {
	let (host, dom, root) = setup();

	let click = Handler::new(|_| Ok(()));
	let tree = |label: &str| -> Node {
		h("div")
			.attr("id", "x")
			.class("a b")
			.style("color", "red")
			.on("click", click.clone())
			.child(text(label))
			.child(fragment([h("b").key("1"), h("i").key("2")]))
			.into()
	};

	let mut old = tree("first");
	dom.mount(&mut old, root, None).unwrap();
	let once = dom.patch(old, tree("second"), root).unwrap();

	let before = host.borrow().mutations();
	let twice = dom.patch(once, tree("second"), root).unwrap();
	assert_eq!(host.borrow().mutations(), before);
	assert_eq!(host.borrow().inner_html(root), r#"<div class="a b" id="x" style="color: red;">second<b></b><i></i></div>"#);
	assert_eq!(host.borrow().listener_count(), 1);
	assert!(twice.is_live());
}

#[test]
fn mount_and_destroy_are_inverse() {
	let (host, dom, root) = setup();

	let mut sibling: Node = h("header").child("stays").into();
	dom.mount(&mut sibling, root, None).unwrap();
	let html = host.borrow().inner_html(root);
	let child_count = host.borrow().children(root).len();

	let mut tree: Node = fragment([
		text("a"),
		h("section").on("click", Handler::new(|_| Ok(()))).child(h("p").child("b")).into(),
		fragment([text("c"), h("hr").into()]),
	]);
	dom.mount(&mut tree, root, Some(0)).unwrap();
	assert_eq!(host.borrow().children(root).len(), child_count + 4);
	assert_eq!(host.borrow().inner_html(root), "a<section><p>b</p></section>c<hr></hr><header>stays</header>");
	let units = tree.units();

	dom.destroy(&mut tree).unwrap();
	let host = host.borrow();
	assert_eq!(host.inner_html(root), html);
	assert_eq!(host.children(root).len(), child_count);
	assert_eq!(host.listener_count(), 0);
	assert!(units.iter().all(|&unit| !host.contains(unit)));
}

#[test]
fn keyed_reorder_moves_existing_units() {
	let (host, dom, root) = setup();
	let list = |keys: &[&str]| -> Node { h("ul").children(keys.iter().map(|&key| h("li").key(key).child(key))).into() };

	let mut old = list(&["a", "b", "c"]);
	dom.mount(&mut old, root, None).unwrap();
	let ul = old.first_unit().unwrap();
	let units = host.borrow().children(ul).to_vec();

	let before = host.borrow().mutations();
	let new = dom.patch(old, list(&["c", "a", "b"]), root).unwrap();

	assert_eq!(new.first_unit(), Some(ul));
	assert_eq!(host.borrow().children(ul).to_vec(), vec![units[2], units[0], units[1]]);
	assert_eq!(host.borrow().inner_html(ul), "<li>c</li><li>a</li><li>b</li>");
	// A single move.
	assert_eq!(host.borrow().mutations() - before, 2);
}

#[test]
fn additions_inside_fragments_land_between_siblings() {
	let (host, dom, root) = setup();

	let mut old: Node = h("div").child("a").child(fragment([h("b"), h("i")])).child("z").into();
	dom.mount(&mut old, root, None).unwrap();
	let mut new = dom.patch(old, h("div").child("a").child(fragment([h("b"), h("u"), h("i")])).child("z").into(), root).unwrap();

	assert_eq!(host.borrow().inner_html(root), "<div>a<b></b><u></u><i></i>z</div>");
	dom.destroy(&mut new).unwrap();
	assert_eq!(host.borrow().inner_html(root), "");
}

#[test]
fn root_fragment_patches_at_its_own_offset() {
	let (host, dom, root) = setup();

	let mut header: Node = h("header").into();
	let mut footer: Node = h("footer").into();
	dom.mount(&mut header, root, None).unwrap();
	dom.mount(&mut footer, root, None).unwrap();

	let mut middle = fragment([h("p")]);
	dom.mount(&mut middle, root, Some(1)).unwrap();
	assert_eq!(host.borrow().inner_html(root), "<header></header><p></p><footer></footer>");

	let middle = dom.patch(middle, fragment([h("p"), h("q")]), root).unwrap();
	assert_eq!(host.borrow().inner_html(root), "<header></header><p></p><q></q><footer></footer>");

	let middle = dom.patch(middle, fragment([h("q")]), root).unwrap();
	assert_eq!(host.borrow().inner_html(root), "<header></header><q></q><footer></footer>");
	assert_eq!(middle.unit_count(), 1);
}

#[test]
fn empty_root_fragment_keeps_its_place() {
	let (host, dom, root) = setup();

	let mut header: Node = h("header").into();
	let mut footer: Node = h("footer").into();
	dom.mount(&mut header, root, None).unwrap();
	dom.mount(&mut footer, root, None).unwrap();

	let mut middle = fragment(Vec::<Node>::new());
	dom.mount(&mut middle, root, Some(1)).unwrap();
	let middle = dom.patch(middle, fragment([h("p")]), root).unwrap();
	assert_eq!(host.borrow().inner_html(root), "<header></header><p></p><footer></footer>");

	let middle = dom.patch(middle, fragment(Vec::<Node>::new()), root).unwrap();
	assert_eq!(host.borrow().inner_html(root), "<header></header><footer></footer>");
	let _middle = dom.patch(middle, fragment([h("q"), h("r")]), root).unwrap();
	assert_eq!(host.borrow().inner_html(root), "<header></header><q></q><r></r><footer></footer>");
}

#[test]
fn unequal_root_is_replaced_in_place() {
	let (host, dom, root) = setup();

	let mut header: Node = h("header").into();
	let mut footer: Node = h("footer").into();
	dom.mount(&mut header, root, None).unwrap();
	dom.mount(&mut footer, root, None).unwrap();
	let mut p: Node = h("p").child("old").into();
	dom.mount(&mut p, root, Some(1)).unwrap();
	let old_unit = p.first_unit().unwrap();

	let div = dom.patch(p, h("div").child("new").into(), root).unwrap();
	assert_ne!(div.first_unit(), Some(old_unit));
	assert!(!host.borrow().contains(old_unit));
	assert_eq!(host.borrow().inner_html(root), "<header></header><div>new</div><footer></footer>");
}

#[test]
fn removed_and_changed_handlers_are_rebound() {
	let (host, dom, root) = setup();
	let calls = Rc::new(RefCell::new(Vec::new()));
	let handler = |name: &'static str| {
		let calls = Rc::clone(&calls);
		Handler::new(move |event| {
			calls.borrow_mut().push((name, event.name.clone()));
			Ok(())
		})
	};
	let first = handler("first");

	let mut old: Node = h("button").on("click", first.clone()).on("focus", handler("focus")).into();
	dom.mount(&mut old, root, None).unwrap();
	let button = old.first_unit().unwrap();
	assert_eq!(host.borrow().listener_count(), 2);

	let kept = dom.patch(old, h("button").on("click", first.clone()).into(), root).unwrap();
	assert_eq!(host.borrow().listener_count(), 1);
	MemoryHost::dispatch(&host, button, "click").unwrap();
	assert_eq!(MemoryHost::dispatch(&host, button, "focus").unwrap(), 0);

	let _changed = dom.patch(kept, h("button").on("click", handler("second")).into(), root).unwrap();
	assert_eq!(host.borrow().listener_count(), 1);
	MemoryHost::dispatch(&host, button, "click").unwrap();

	assert_eq!(*calls.borrow(), [("first", "click".to_owned()), ("second", "click".to_owned())]);
}

#[test]
fn misuse_is_reported() {
	let (_host, dom, root) = setup();

	assert!(matches!(dom.patch(h("p").into(), h("p").into(), root), Err(Error::NotLive)));
	assert!(matches!(dom.mount(&mut slot([text("x")]), root, None), Err(Error::UnexpectedSlot)));
	let mut nested: Node = h("div").child(slot(Vec::<Node>::new())).into();
	assert!(matches!(dom.mount(&mut nested, root, None), Err(Error::UnexpectedSlot)));
	assert!(matches!(dom.destroy(&mut text("never mounted")), Err(Error::NotLive)));

	let mut button: Node = h("button").on("click", Handler::bound(|_, _| Ok(()))).into();
	assert!(matches!(dom.mount(&mut button, root, None), Err(Error::NoOwner(event)) if event == "click"));
}

#[test]
fn depth_limit() {
	let host = Rc::new(RefCell::new(MemoryHost::new()));
	let root = host.borrow().root();
	let dom = Dom::with_options(host.clone(), DomOptions { depth_limit: 2, ..DomOptions::default() });

	let mut shallow: Node = h("a").child(h("b")).into();
	dom.mount(&mut shallow, root, None).unwrap();

	let mut deep: Node = h("a").child(h("b").child(h("c"))).into();
	assert!(matches!(dom.mount(&mut deep, root, None), Err(Error::DepthLimit(2))));
}
