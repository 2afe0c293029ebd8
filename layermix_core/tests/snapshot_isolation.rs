// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer-list changes while a render pass is blocked inside a layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration as StdDuration;

use crossbeam_channel::{Receiver, Sender};
use layermix_core::composition::{Composition, CompositionConfig};
use layermix_core::gpu::Color;
use layermix_core::headless::{HeadlessBackend, HeadlessContext};
use layermix_core::layer::{Layer, LayerCore, LayerRef};
use layermix_core::time::{Clock, HostTime, ManualClock};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<&'static str>>>;

const TIMEOUT: StdDuration = StdDuration::from_secs(5);

struct Stub {
    core: LayerCore<HeadlessBackend>,
    name: &'static str,
    log: Log,
    gate: Option<Gate>,
}

/// Blocks the first render until released.
struct Gate {
    entered: Sender<()>,
    release: Receiver<()>,
    armed: AtomicBool,
}

impl Layer<HeadlessBackend> for Stub {
    fn core(&self) -> &LayerCore<HeadlessBackend> {
        &self.core
    }

    fn render(&self, _ctx: &mut HeadlessContext) {
        self.log.lock().push(self.name);
        if let Some(gate) = &self.gate {
            if gate.armed.swap(false, Ordering::SeqCst) {
                gate.entered.send(()).unwrap();
                gate.release.recv_timeout(TIMEOUT).unwrap();
            }
        }
    }
}

fn stub(
    comp: &Composition<HeadlessBackend>,
    name: &'static str,
    log: &Log,
    gate: Option<Gate>,
) -> LayerRef<HeadlessBackend> {
    Arc::new(Stub {
        core: LayerCore::new(Arc::clone(comp.backend()), false, false),
        name,
        log: Arc::clone(log),
        gate,
    })
}

fn composition() -> Arc<Composition<HeadlessBackend>> {
    Composition::new(
        Arc::new(HeadlessBackend::new()),
        CompositionConfig::new(16, 16),
        Arc::new(ManualClock::new(HostTime(0))) as Arc<dyn Clock>,
    )
}

#[test]
fn removal_during_render_does_not_disturb_the_pass() {
    let comp = composition();
    let log = Log::default();
    let (entered_tx, entered) = crossbeam_channel::bounded(1);
    let (release, release_rx) = crossbeam_channel::bounded(1);

    let first = stub(
        &comp,
        "first",
        &log,
        Some(Gate {
            entered: entered_tx,
            release: release_rx,
            armed: AtomicBool::new(true),
        }),
    );
    let middle = stub(&comp, "middle", &log, None);
    let last = stub(&comp, "last", &log, None);
    for layer in [&first, &middle, &last] {
        assert!(comp.add_layer(Arc::clone(layer)), "distinct layers are added");
    }
    let last_weak: Weak<dyn Layer<HeadlessBackend>> = Arc::downgrade(&last);

    let renderer = {
        let comp = Arc::clone(&comp);
        thread::spawn(move || comp.render(&mut HeadlessContext::new(16, 16, Color::BLACK)))
    };
    entered.recv_timeout(TIMEOUT).unwrap();

    // The pass is parked inside `first`; the list lock must be free.
    assert!(comp.remove_layer(&last), "removal completes mid-pass");
    drop(last);
    let late = stub(&comp, "late", &log, None);
    assert!(comp.add_layer(late), "insertion completes mid-pass");
    assert!(
        last_weak.upgrade().is_some(),
        "the in-flight snapshot keeps the removed layer alive"
    );

    release.send(()).unwrap();
    renderer.join().unwrap();
    assert_eq!(
        *log.lock(),
        ["first", "middle", "last"],
        "the pass finishes with the layers it started with"
    );
    assert!(last_weak.upgrade().is_none(), "freed once the pass ends");

    log.lock().clear();
    comp.render(&mut HeadlessContext::new(16, 16, Color::BLACK));
    assert_eq!(*log.lock(), ["first", "middle", "late"], "next pass sees the change");
}

#[test]
fn tick_and_hit_test_run_while_render_is_blocked() {
    let comp = composition();
    let log = Log::default();
    let (entered_tx, entered) = crossbeam_channel::bounded(1);
    let (release, release_rx) = crossbeam_channel::bounded(1);
    comp.add_layer(stub(
        &comp,
        "gate",
        &log,
        Some(Gate {
            entered: entered_tx,
            release: release_rx,
            armed: AtomicBool::new(true),
        }),
    ));

    let renderer = {
        let comp = Arc::clone(&comp);
        thread::spawn(move || comp.render(&mut HeadlessContext::new(1, 1, Color::BLACK)))
    };
    entered.recv_timeout(TIMEOUT).unwrap();

    comp.tick(layermix_core::time::Duration::SECOND);
    let mut point = layermix_core::geometry::PixelPoint { x: 1, y: 1 };
    assert!(
        comp.layer_from_point(&mut point).is_none(),
        "the stub takes no input"
    );
    comp.clear();
    assert!(comp.is_empty());

    release.send(()).unwrap();
    renderer.join().unwrap();
    assert_eq!(*log.lock(), ["gate"]);
    assert_eq!(comp.time(), layermix_core::time::Duration::SECOND);
}
