#![cfg(not(target_arch = "wasm32"))]

use anyhow::anyhow;
use ligule::{component, h, Component, Dom, MemoryHost, Node, Unit};
use serde_json::json;
use std::{cell::RefCell, rc::Rc};

type Log = Rc<RefCell<Vec<String>>>;

fn setup() -> (Rc<RefCell<MemoryHost>>, Dom, Unit) {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	let host = Rc::new(RefCell::new(MemoryHost::new()));
	let root = host.borrow().root();
	let dom = Dom::new(host.clone());
	(host, dom, root)
}

fn logging(name: &'static str, log: &Log, inner: Option<&Component>) -> Component {
	let inner = inner.cloned();
	let mounted = Rc::clone(log);
	let unmounted = Rc::clone(log);
	Component::builder(name)
		.render(move |_| match &inner {
			Some(inner) => h("div").child(component(inner)).into(),
			None => h("span").into(),
		})
		.on_mounted(move |ctx| {
			assert!(ctx.is_mounted());
			mounted.borrow_mut().push(format!("{} mounted", name));
			Ok(None)
		})
		.on_unmounted(move |ctx| {
			assert!(!ctx.is_mounted());
			unmounted.borrow_mut().push(format!("{} unmounted", name));
			Ok(None)
		})
		.build()
}

#[test]
fn hooks_are_deferred_and_inner_first() {
	let (_host, dom, root) = setup();
	let log = Log::default();
	let inner = logging("inner", &log, None);
	let outer = logging("outer", &log, Some(&inner));

	let mut tree: Node = component(&outer).into();
	dom.mount(&mut tree, root, None).unwrap();
	assert!(log.borrow().is_empty());
	assert_eq!(dom.scheduler().pending(), 2);

	assert_eq!(dom.flush(), 2);
	assert_eq!(*log.borrow(), ["inner mounted", "outer mounted"]);

	dom.destroy(&mut tree).unwrap();
	assert_eq!(log.borrow().len(), 2);
	dom.flush();
	assert_eq!(*log.borrow(), ["inner mounted", "outer mounted", "inner unmounted", "outer unmounted"]);
}

#[test]
fn mounted_hooks_see_attached_units() {
	let (host, dom, root) = setup();
	let seen = Rc::new(RefCell::new(Vec::new()));
	let watcher = {
		let host = Rc::clone(&host);
		let seen = Rc::clone(&seen);
		Component::builder("Watcher")
			.render(|_| h("section").child("x").into())
			.on_mounted(move |ctx| {
				let host = host.borrow();
				seen.borrow_mut().extend(ctx.units().into_iter().map(|unit| host.parent(unit)));
				Ok(None)
			})
			.build()
	};

	let mut tree: Node = h("main").child(component(&watcher)).into();
	dom.mount(&mut tree, root, None).unwrap();
	dom.flush();
	assert_eq!(*seen.borrow(), [tree.first_unit()]);
}

#[test]
fn state_changes_from_hooks_rerender() {
	let (host, dom, root) = setup();
	let loader = Component::builder("Loader")
		.state(|_| json!({ "status": "loading" }))
		.render(|ctx| h("p").child(ctx.get("status").and_then(|status| status.as_str().map(str::to_owned)).unwrap_or_default()).into())
		.on_mounted(|ctx| {
			ctx.set_state(json!({ "status": "ready" }))?;
			Ok(None)
		})
		.build();

	let mut tree: Node = component(&loader).into();
	dom.mount(&mut tree, root, None).unwrap();
	assert_eq!(host.borrow().inner_html(root), "<p>loading</p>");
	dom.flush();
	assert_eq!(host.borrow().inner_html(root), "<p>ready</p>");
}

#[test]
fn failures_are_isolated_and_reported() {
	let (_host, dom, root) = setup();
	let reported = Rc::new(RefCell::new(Vec::new()));
	{
		let reported = Rc::clone(&reported);
		dom.scheduler().set_error_reporter(move |error| reported.borrow_mut().push(error.to_string()));
	}
	let log = Log::default();

	let failing = Component::builder("Failing").on_mounted(|_| Err(anyhow!("sync failure"))).build();
	let rejecting = Component::builder("Rejecting")
		.on_mounted_async(|_| async { Err::<(), _>(anyhow!("async failure")) })
		.build();
	let fine = {
		let log = Rc::clone(&log);
		Component::builder("Fine")
			.on_mounted_async(move |ctx| {
				let log = Rc::clone(&log);
				async move {
					log.borrow_mut().push(format!("mounted: {}", ctx.is_mounted()));
					Ok::<(), anyhow::Error>(())
				}
			})
			.build()
	};

	let mut tree: Node = h("div").child(component(&failing)).child(component(&rejecting)).child(component(&fine)).into();
	dom.mount(&mut tree, root, None).unwrap();
	assert_eq!(dom.flush(), 3);

	assert_eq!(*log.borrow(), ["mounted: true"]);
	assert_eq!(*reported.borrow(), ["sync failure", "async failure"]);
	assert_eq!(dom.scheduler().pending(), 0);
}

#[test]
fn next_tick_runs_hooks() {
	let (_host, dom, root) = setup();
	let log = Log::default();
	let leaf = logging("leaf", &log, None);

	let mut tree: Node = component(&leaf).into();
	dom.mount(&mut tree, root, None).unwrap();
	futures::executor::block_on(dom.next_tick());
	assert_eq!(*log.borrow(), ["leaf mounted"]);
	assert!(!dom.scheduler().is_scheduled());
}

#[test]
fn hooks_queued_before_an_unmount_still_run_in_order() {
	let (_host, dom, root) = setup();
	let log = Log::default();
	let observer = {
		let mounted = Rc::clone(&log);
		let unmounted = Rc::clone(&log);
		Component::builder("Observer")
			.on_mounted(move |ctx| {
				mounted.borrow_mut().push(format!("mounted: {}", ctx.is_mounted()));
				Ok(None)
			})
			.on_unmounted(move |ctx| {
				unmounted.borrow_mut().push(format!("unmounted: {}", ctx.is_mounted()));
				Ok(None)
			})
			.build()
	};

	let mut tree: Node = component(&observer).into();
	dom.mount(&mut tree, root, None).unwrap();
	dom.destroy(&mut tree).unwrap();
	assert!(log.borrow().is_empty());

	dom.flush();
	assert_eq!(*log.borrow(), ["mounted: false", "unmounted: false"]);
}
