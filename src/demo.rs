// Demo mode: mount a small counter chat and stream commits through it
//
// Shows the scheduler at work against a console adapter:
// - bursts of commits coalesce into one dispatched message each
// - while the suspend marker is set, nothing is dispatched at all
// - a redirect is recorded through the storage-backed navigator
//
// Run with: cargo run -- demo --bursts 3 --burst-size 5

use crate::cli::DemoArgs;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chatmount::adapter::{Adapter, MenuEntry};
use chatmount::builder::HostContext;
use chatmount::config::Config;
use chatmount::renderer::{RedirectOptions, Renderer};
use chatmount::snapshot::ContainerSnapshot;
use chatmount::storage::{FileStorage, MemoryStorage, StorageBackend, StorageNavigator};
use chatmount::suspend::SHOULD_SUSPEND_PROP;
use chatmount::tree::{
    ComponentJson, Handler, InstanceType, NodeId, PropValue, Props, VALUE_PROP,
};
use chatmount::RenderEvent;
use serde_json::json;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const CHAT_KEY: &str = "demo-chat";

/// Gap between commits inside a burst (well under the debounce window)
const COMMIT_GAP: Duration = Duration::from_millis(20);

// ─────────────────────────────────────────────────────────────────────────────
// Console adapter
// ─────────────────────────────────────────────────────────────────────────────

/// Renders containers as plain text and prints them
#[derive(Default)]
pub struct ConsoleAdapter {
    dispatches: AtomicUsize,
}

impl ConsoleAdapter {
    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }
}

/// Flatten a serialized tree into message text and button labels
fn render_text(nodes: &[ComponentJson], text: &mut String, buttons: &mut Vec<String>) {
    for node in nodes {
        match node.kind {
            InstanceType::Text => {
                if let Some(value) = node.props.get(VALUE_PROP).and_then(|v| v.as_str()) {
                    text.push_str(value);
                }
            }
            InstanceType::LineBreak => text.push('\n'),
            InstanceType::Header => {
                text.push('*');
                render_text(&node.children, text, buttons);
                text.push('*');
            }
            InstanceType::Button => {
                let mut label = String::new();
                render_text(&node.children, &mut label, &mut Vec::new());
                buttons.push(label);
            }
            InstanceType::Suspendable => {}
            _ => render_text(&node.children, text, buttons),
        }
    }
}

#[async_trait]
impl Adapter for ConsoleAdapter {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn adapt(
        &self,
        container: &ContainerSnapshot,
        is_update: bool,
    ) -> Result<serde_json::Value> {
        let mut text = String::new();
        let mut buttons = Vec::new();
        render_text(&container.children, &mut text, &mut buttons);

        let n = self.dispatches.fetch_add(1, Ordering::SeqCst) + 1;
        println!("── message #{n} to {} ──", container.key);
        println!("{}", text.trim());
        if !buttons.is_empty() {
            println!("[ {} ]", buttons.join(" | "));
        }

        Ok(json!({
            "chat": container.key,
            "edit": is_update,
            "text": text,
            "buttons": buttons,
        }))
    }

    async fn component_on_mount(&self, container: &ContainerSnapshot) -> Result<()> {
        tracing::info!(chat = %container.key, "mounted on console");
        Ok(())
    }

    async fn set_menus(&self, menus: &[MenuEntry]) -> Result<()> {
        for menu in menus {
            println!("/{:<10} {}", menu.command, menu.description);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Demo driver
// ─────────────────────────────────────────────────────────────────────────────

/// What the run produced, for the summary line (and tests)
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DemoReport {
    pub commits: u64,
    pub dispatches: usize,
    pub dispatched_while_suspended: usize,
}

/// Node handles the driver needs after mounting
struct CounterChat {
    marker: NodeId,
    root: NodeId,
    label: NodeId,
}

fn mount_counter(renderer: &mut Renderer, clicks: Arc<AtomicU64>) -> Result<CounterChat> {
    let container = renderer.create_container(CHAT_KEY);
    let ctx = HostContext::new(CHAT_KEY);
    let surface = renderer.surface_mut();

    let marker = surface.create_instance(
        InstanceType::Suspendable,
        Props::from_pairs([(SHOULD_SUSPEND_PROP, false)]),
        container,
        &ctx,
    );
    let root = surface.create_instance(InstanceType::Container, Props::new(), container, &ctx);

    let header = surface.create_instance(InstanceType::Header, Props::new(), container, &ctx);
    let title = surface.create_text_instance("Counter", container, &ctx);
    surface.append_initial_child(header, title)?;
    surface.finalize_initial_children(header)?;

    let label = surface.create_text_instance("count: 0", container, &ctx);

    let button = surface.create_instance(
        InstanceType::Button,
        Props::from_pairs([("key", "inc")]).with(
            "onClick",
            Handler::new("() => setCount(c => c + 1)", move || {
                clicks.fetch_add(1, Ordering::SeqCst);
            }),
        ),
        container,
        &ctx,
    );
    let button_label = surface.create_text_instance("+1", container, &ctx);
    surface.append_initial_child(button, button_label)?;

    for child in [header, label, button] {
        surface.append_initial_child(root, child)?;
    }
    surface.append_child_to_container(container, marker)?;
    surface.append_child_to_container(container, root)?;

    Ok(CounterChat {
        marker,
        root,
        label,
    })
}

/// Commit a prop change on a root node
fn commit(
    renderer: &mut Renderer,
    node: NodeId,
    name: &str,
    value: impl Into<PropValue>,
) -> Result<()> {
    let surface = renderer.surface_mut();
    let old = surface.tree().node(node)?.props().clone();
    let new = old.with(name, value);
    surface.commit_update(node, &old, &new)?;
    Ok(())
}

pub async fn run_demo(config: &Config, args: DemoArgs) -> Result<DemoReport> {
    let scheduler = config.scheduler.to_scheduler_config();
    let storage: Arc<dyn StorageBackend> = match &config.storage.dir {
        Some(dir) => Arc::new(FileStorage::new(dir).context("Failed to open demo storage")?),
        None => Arc::new(MemoryStorage::new()),
    };

    let adapter = Arc::new(ConsoleAdapter::default());
    let mut renderer = Renderer::new(adapter.clone(), scheduler)
        .with_storage(Arc::clone(&storage))
        .with_navigator(Arc::new(StorageNavigator::new(storage)));

    renderer
        .set_menus(&[
            MenuEntry::new("start", "Mount the counter"),
            MenuEntry::new("summary", "Show the run summary"),
        ])
        .await?;

    let clicks = Arc::new(AtomicU64::new(0));
    let chat = mount_counter(&mut renderer, Arc::clone(&clicks))?;
    let container = renderer
        .surface()
        .tree()
        .container_of(chat.root)
        .context("counter root is not mounted")?;

    renderer.on(CHAT_KEY, |event| match event {
        RenderEvent::Update { snapshot, .. } => {
            tracing::debug!(nodes = snapshot.children.len(), "chat settled");
        }
        RenderEvent::DispatchFailed { message, .. } => {
            tracing::warn!("dispatch failed: {}", message);
        }
        RenderEvent::Mounted { .. } => {}
    });
    renderer.render(container).await?;

    let mut report = DemoReport::default();

    // Bursts: many commits, one message each
    for burst in 1..=args.bursts {
        let settled = renderer.wait_for_update(CHAT_KEY);
        for _ in 0..args.burst_size {
            renderer.dispatch_interaction(container, "inc")?;
            let count = clicks.load(Ordering::SeqCst);
            renderer
                .surface_mut()
                .commit_text_update(chat.label, "", &format!("count: {count}"))?;
            commit(&mut renderer, chat.root, "count", count as i64)?;
            report.commits += 1;
            sleep(COMMIT_GAP).await;
        }
        settled.await?;
        tracing::info!(burst, dispatches = adapter.dispatches(), "burst settled");
    }

    // Suspended: commits pile up, nothing goes out
    if args.suspend {
        println!("── suspending {CHAT_KEY} ──");
        commit(&mut renderer, chat.marker, SHOULD_SUSPEND_PROP, true)?;
        let before = adapter.dispatches();
        for _ in 0..args.burst_size {
            renderer.dispatch_interaction(container, "inc")?;
            let count = clicks.load(Ordering::SeqCst) as i64;
            commit(&mut renderer, chat.root, "count", count)?;
            report.commits += 1;
            sleep(COMMIT_GAP).await;
        }
        sleep(scheduler.max_wait + scheduler.debounce).await;
        report.dispatched_while_suspended = adapter.dispatches() - before;

        println!("── resuming {CHAT_KEY} ──");
        let settled = renderer.wait_for_update(CHAT_KEY);
        let count = clicks.load(Ordering::SeqCst);
        renderer
            .surface_mut()
            .commit_text_update(chat.label, "", &format!("count: {count}"))?;
        commit(&mut renderer, chat.marker, SHOULD_SUSPEND_PROP, false)?;
        settled.await?;
    }

    renderer
        .redirect_to(
            container,
            &format!("/summary?clicks={}", clicks.load(Ordering::SeqCst)),
            RedirectOptions {
                should_render: true,
            },
        )
        .await?;
    renderer.persist(container)?;

    report.dispatches = adapter.dispatches();
    println!(
        "── {} commits, {} messages, {} while suspended ──",
        report.commits, report.dispatches, report.dispatched_while_suspended
    );
    renderer.shutdown().await?;
    Ok(report)
}
