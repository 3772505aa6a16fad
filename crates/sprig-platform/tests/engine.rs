use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use sprig_core::NodeKind;
use sprig_core::prelude::*;
use sprig_platform::{EventLoop, HostCapabilities, TestClock};

fn setup(capabilities: HostCapabilities) -> (Rc<EventLoop>, Engine, NodeId) {
    let _ = env_logger::builder().is_test(true).try_init();
    let event_loop = EventLoop::new(capabilities);
    let engine = Engine::new(event_loop.clone(), EngineOptions::default());
    let container = engine.create_container();
    (event_loop, engine, container)
}

fn elements(tree: &HostTree, parent: NodeId) -> Vec<NodeId> {
    tree.children(parent)
        .into_iter()
        .filter(|&id| matches!(tree.kind(id), Some(NodeKind::Element { .. })))
        .collect()
}

fn keyed_items(names: &[&str]) -> Value {
    element("ul")
        .child(
            list(names.iter().map(|name| Value::from(*name)))
                .keyed(|item, _| Key::from(item.as_str().unwrap_or_default()))
                .map(|item, _| element("li").child(item.clone()).into()),
        )
        .into()
}

#[test]
fn test_mount_and_update_element_tree() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let mut root = engine
        .mount(
            element("ul")
                .attr("class", "items")
                .child(element("li").child("one"))
                .child(element("li").child("two")),
            container,
        )
        .unwrap();
    assert_eq!(engine.host_tree().to_html(container), "<!---->");

    el.run_until_idle();
    assert_eq!(
        engine.host_tree().to_html(container),
        "<ul class=\"items\"><li>one<!----></li><!----><li>two<!----></li><!----></ul><!---->"
    );
    let ul = elements(&engine.host_tree(), container)[0];

    root.update(
        element("ul")
            .attr("class", "list")
            .child(element("li").child("one"))
            .child(element("li").child("three")),
    )
    .unwrap();
    el.run_until_idle();
    assert_eq!(
        engine.host_tree().to_html(container),
        "<ul class=\"list\"><li>one<!----></li><!----><li>three<!----></li><!----></ul><!---->"
    );
    assert_eq!(elements(&engine.host_tree(), container), [ul]);
    assert_eq!(engine.pending_tasks(), 0);
}

#[test]
fn test_state_setter_rerenders_from_event() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let setter: Rc<RefCell<Option<StateSetter<i64>>>> = Rc::new(RefCell::new(None));
    let renders = Rc::new(Cell::new(0));

    let slot = setter.clone();
    let count = renders.clone();
    let counter = ComponentFn::new("counter", move |_, ctx| {
        count.set(count.get() + 1);
        let (n, set) = ctx.use_state(|| 0i64);
        *slot.borrow_mut() = Some(set);
        Ok(Value::from(n))
    });

    let _root = engine.mount(counter.with(Value::None), container).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().to_html(container), "0<!---->");

    let set = setter.borrow().clone().unwrap();
    el.dispatch_event(EventContinuity::Discrete, || set.update(|n| *n += 1));
    el.run_until_idle();
    assert_eq!(engine.host_tree().to_html(container), "1<!---->");
    assert_eq!(renders.get(), 2);

    // Setting twice before the loop turns renders once.
    set.set(5);
    set.set(6);
    el.run_until_idle();
    assert_eq!(engine.host_tree().to_html(container), "6<!---->");
    assert_eq!(renders.get(), 3);
}

#[test]
fn test_layout_effects_see_mutations_and_passive_effects_run_last() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let setter: Rc<RefCell<Option<StateSetter<i64>>>> = Rc::new(RefCell::new(None));

    let sink = log.clone();
    let slot = setter.clone();
    let view = ComponentFn::new("view", move |_, ctx| {
        let (n, set) = ctx.use_state(|| 0i64);
        *slot.borrow_mut() = Some(set);

        let layout = sink.clone();
        ctx.use_layout_effect(n, move |host| {
            layout
                .borrow_mut()
                .push(format!("layout:{}", host.text_content(container)));
            Cleanup::noop()
        });
        let passive = sink.clone();
        ctx.use_effect(n, move |host| {
            passive
                .borrow_mut()
                .push(format!("passive:{}", host.text_content(container)));
            let undo = passive.clone();
            Cleanup::new(move || undo.borrow_mut().push(format!("undo:{n}")))
        });
        Ok(element("p").child(n).into())
    });

    let _root = engine.mount(view.with(Value::None), container).unwrap();
    el.run_until_idle();
    assert_eq!(*log.borrow(), ["layout:0", "passive:0"]);

    let set = setter.borrow().clone().unwrap();
    set.set(1);
    el.run_until_idle();
    assert_eq!(
        *log.borrow(),
        ["layout:0", "passive:0", "layout:1", "undo:0", "passive:1"]
    );
}

#[test]
fn test_wait_for_update_settles_after_failed_render() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let broken = ComponentFn::new("broken", |_, _| {
        Err(Error::ValueShape {
            binding: "broken",
            expected: "nothing",
        })
    });

    let _root = engine.mount(broken.with(Value::None), container).unwrap();
    assert!(engine.pending_tasks() > 0);
    assert_eq!(el.block_on(engine.wait_for_update()), Some(()));
    assert_eq!(engine.pending_tasks(), 0);

    let errors = el.take_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], Error::ValueShape { binding: "broken", .. }));
    assert_eq!(engine.host_tree().to_html(container), "<!---->");
}

#[test]
fn test_background_fallback_runs_once_in_idle_time() {
    let (el, engine, _) = setup(HostCapabilities {
        idle_callback: true,
        ..HostCapabilities::none()
    });
    let runs = Rc::new(Cell::new(0));

    let count = runs.clone();
    let task = engine
        .scheduler()
        .request_callback(TaskPriority::Background, move || async move {
            count.set(count.get() + 1);
            Ok(())
        });
    assert!(matches!(el.block_on(task), Some(Ok(()))));
    el.run_until_idle();

    assert_eq!(runs.get(), 1);
    let stats = el.stats();
    assert_eq!(stats.idle_callbacks, 1);
    assert_eq!(stats.tasks, 0);
    assert_eq!(stats.timeouts, 0);
}

#[test]
fn test_fallbacks_without_any_capability() {
    let (el, engine, container) = setup(HostCapabilities::none());
    let hello = ComponentFn::new("hello", |_, _| Ok(element("p").child("hi").into()));
    let _root = engine.mount(hello.with(Value::None), container).unwrap();
    el.run_until_idle();

    assert_eq!(engine.host_tree().to_html(container), "<p>hi<!----></p><!---->");
    let stats = el.stats();
    assert_eq!(stats.tasks, 0);
    // The render goes to a timeout, the commit to a microtask.
    assert_eq!(stats.timeouts, 1);
    assert!(stats.microtasks >= 1);
}

fn sliced_render(pending_input: bool) -> (usize, String) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Rc::new(TestClock::new());
    let el = EventLoop::with_clock(HostCapabilities::all(), clock.clone());
    let engine = Engine::new(el.clone(), EngineOptions::default());
    let container = engine.create_container();

    let slow = ComponentFn::new("slow", move |props, _| {
        clock.advance(Duration::from_millis(10));
        Ok(props.clone())
    });
    let parent = ComponentFn::new("parent", move |_, _| {
        let slow = slow.clone();
        Ok(list(["a", "b", "c"].map(Value::from))
            .map(move |item, _| slow.with(item.clone()))
            .into())
    });

    let _root = engine.mount(parent.with(Value::None), container).unwrap();
    el.set_pending_input(pending_input, false);
    el.run_until_idle();
    let text = engine.host_tree().text_content(container);
    (el.stats().continuations, text)
}

#[test]
fn test_render_yields_only_when_input_is_pending() {
    let (continuations, text) = sliced_render(true);
    assert!(continuations >= 1);
    assert_eq!(text, "abc");

    let (continuations, text) = sliced_render(false);
    assert_eq!(continuations, 0);
    assert_eq!(text, "abc");
}

#[test]
fn test_keyed_reorder_keeps_nodes() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let mut root = engine.mount(keyed_items(&["a", "b", "c", "d"]), container).unwrap();
    el.run_until_idle();

    let ul = elements(&engine.host_tree(), container)[0];
    let before = elements(&engine.host_tree(), ul);
    assert_eq!(before.len(), 4);
    assert_eq!(engine.host_tree().text_content(ul), "abcd");

    root.update(keyed_items(&["d", "a", "b", "c"])).unwrap();
    el.run_until_idle();
    let after = elements(&engine.host_tree(), ul);
    assert_eq!(after, [before[3], before[0], before[1], before[2]]);
    assert_eq!(engine.host_tree().text_content(ul), "dabc");

    root.update(keyed_items(&["b", "e"])).unwrap();
    el.run_until_idle();
    let after = elements(&engine.host_tree(), ul);
    assert_eq!(after.len(), 2);
    assert_eq!(after[0], before[1]);
    assert!(!before.contains(&after[1]));
    assert_eq!(engine.host_tree().text_content(ul), "be");
}

#[test]
fn test_duplicate_keys_leave_list_unchanged() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let mut root = engine.mount(keyed_items(&["a", "b"]), container).unwrap();
    el.run_until_idle();
    let html = engine.host_tree().to_html(container);

    let err = root.update(keyed_items(&["a", "c", "a"])).unwrap_err();
    assert!(matches!(err, Error::DuplicateKey(Key::Str(ref key)) if &**key == "a"));
    el.run_until_idle();
    assert_eq!(engine.host_tree().to_html(container), html);

    root.update(keyed_items(&["b", "a"])).unwrap();
    el.run_until_idle();
    let ul = elements(&engine.host_tree(), container)[0];
    assert_eq!(engine.host_tree().text_content(ul), "ba");
}

/// A keyed list of plain strings where `"bad"` maps to a value no child
/// part can render.
fn keyed_or_broken(names: &[&str]) -> Value {
    list(names.iter().map(|name| Value::from(*name)))
        .keyed(|item, _| Key::from(item.as_str().unwrap_or_default()))
        .map(|item, _| match item.as_str() {
            Some("bad") => Value::record([("bad", item.clone())]),
            _ => item.clone(),
        })
        .into()
}

#[test]
fn test_failed_item_render_is_recovered_by_next_render() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let mut root = engine.mount(keyed_or_broken(&["a", "b"]), container).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().text_content(container), "ab");
    let nodes = engine.host_tree().len();

    let err = root.update(keyed_or_broken(&["a", "bad"])).unwrap_err();
    assert!(matches!(err, Error::ValueShape { binding: "child", .. }));
    el.run_until_idle();
    assert_eq!(engine.host_tree().to_html(container), "<!---->");

    root.update(keyed_or_broken(&["a", "b"])).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().text_content(container), "ab");
    assert_eq!(engine.host_tree().len(), nodes);
    assert_eq!(engine.pending_tasks(), 0);

    // The same failure on a mid-list update.
    root.update(keyed_or_broken(&["b", "bad", "a"])).unwrap_err();
    root.update(keyed_or_broken(&["b", "a"])).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().text_content(container), "ba");
    assert_eq!(engine.host_tree().len(), nodes);
}

#[test]
fn test_replaced_items_are_freed() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let mut root = engine.mount(keyed_items(&["k0"]), container).unwrap();
    el.run_until_idle();
    let nodes = engine.host_tree().len();

    for i in 1..200 {
        let key = format!("k{i}");
        root.update(keyed_items(&[key.as_str()])).unwrap();
        el.run_until_idle();
    }
    let ul = elements(&engine.host_tree(), container)[0];
    assert_eq!(engine.host_tree().text_content(ul), "k199");
    assert_eq!(engine.host_tree().len(), nodes);
}

#[test]
fn test_switching_content_kind_keeps_tree_bounded() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let mut root = engine.mount("start", container).unwrap();
    el.run_until_idle();
    root.update(element("b").child("x")).unwrap();
    el.run_until_idle();
    let nodes = engine.host_tree().len();

    for i in 0..20 {
        root.update(format!("t{i}")).unwrap();
        el.run_until_idle();
        assert_eq!(engine.host_tree().to_html(container), format!("t{i}<!---->"));
        root.update(element("b").child("x")).unwrap();
        el.run_until_idle();
    }
    assert_eq!(engine.host_tree().to_html(container), "<b>x<!----></b><!---->");
    assert_eq!(engine.host_tree().len(), nodes);
}

#[test]
fn test_unkeyed_lists_update_by_position() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let mut root = engine.mount(list(["x", "y", "z"].map(Value::from)), container).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().text_content(container), "xyz");

    root.update(list([Value::from("y")])).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().to_html(container), "<!---->y<!----><!---->");

    root.update(list([])).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().to_html(container), "<!---->");

    // A bare list value renders the same way.
    root.update(Value::list([Value::from(1), Value::from(2)])).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().text_content(container), "12");
}

#[test]
fn test_keyed_components_keep_state_across_moves() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let serials = Rc::new(Cell::new(0i64));

    let next = serials.clone();
    let item = ComponentFn::new("item", move |props, ctx| {
        let serial = ctx.remember(|| {
            next.set(next.get() + 1);
            next.get()
        });
        Ok(Value::from(format!(
            "{}{}",
            props.as_str().unwrap_or_default(),
            serial
        )))
    });
    let items = move |names: &[&str]| -> Value {
        let item = item.clone();
        list(names.iter().map(|name| Value::from(*name)))
            .keyed(|name, _| Key::from(name.as_str().unwrap_or_default()))
            .map(move |name, _| item.with(name.clone()))
            .into()
    };

    let mut root = engine.mount(items(&["a", "b", "c"]), container).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().text_content(container), "a1b2c3");

    root.update(items(&["c", "a", "b"])).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().text_content(container), "c3a1b2");

    root.update(items(&["c", "a", "d"])).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().text_content(container), "c3a1d4");
    assert_eq!(engine.blocks().len(), 3);
}

#[test]
fn test_switching_away_and_back_keeps_component_state() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let serials = Rc::new(Cell::new(0i64));

    let next = serials.clone();
    let item = ComponentFn::new("item", move |_, ctx| {
        let serial = ctx.remember(|| {
            next.set(next.get() + 1);
            next.get()
        });
        Ok(Value::from(*serial))
    });

    let mut root = engine.mount(item.with(Value::None), container).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().to_html(container), "1<!---->");

    root.update("plain").unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().to_html(container), "plain<!---->");

    root.update(item.with(Value::None)).unwrap();
    el.run_until_idle();
    assert_eq!(engine.host_tree().to_html(container), "1<!---->");
    assert_eq!(serials.get(), 1);
}

#[test]
fn test_unmount_runs_effect_cleanups() {
    let (el, engine, container) = setup(HostCapabilities::all());
    let log = Rc::new(RefCell::new(Vec::<&'static str>::new()));

    let sink = log.clone();
    let view = ComponentFn::new("view", move |_, ctx| {
        let sink = sink.clone();
        ctx.use_effect(Value::None, move |_| {
            sink.borrow_mut().push("effect");
            Cleanup::new(move || sink.borrow_mut().push("cleanup"))
        });
        Ok(element("span").child("x").into())
    });

    let root = engine.mount(view.with(Value::None), container).unwrap();
    el.run_until_idle();
    assert_eq!(*log.borrow(), ["effect"]);
    assert_eq!(engine.blocks().len(), 1);

    root.unmount();
    el.run_until_idle();
    assert_eq!(*log.borrow(), ["effect", "cleanup"]);
    assert_eq!(engine.host_tree().to_html(container), "");
    assert!(engine.blocks().is_empty());
    assert_eq!(engine.pending_tasks(), 0);
}
