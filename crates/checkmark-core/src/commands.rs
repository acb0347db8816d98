use tracing::{debug, info, instrument};

use crate::cli::Command;
use crate::config::Config;
use crate::filter::{FilterMode, ViewFilter};
use crate::render::Renderer;
use crate::storage::KeyValueStorage;
use crate::store::TaskStore;
use crate::task::TaskId;

#[instrument(skip(store, cfg, renderer))]
pub fn dispatch<S: KeyValueStorage>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Add { title } => cmd_add(store, &title.join(" ")),
        Command::List { filter } => cmd_list(store, cfg, renderer, filter),
        Command::Toggle { id } => cmd_toggle(store, &id),
        Command::Rename { id, title } => cmd_rename(store, &id, &title.join(" ")),
        Command::Remove { id } => cmd_remove(store, &id),
        Command::Count => renderer.print_counts(store.counts()),
    }
}

fn cmd_add<S: KeyValueStorage>(store: &mut TaskStore<S>, title: &str) -> anyhow::Result<()> {
    info!("command add");

    match store.add(title)? {
        Some(task) => println!("Created task {}.", task.id.short()),
        None => println!("Nothing to add."),
    }
    Ok(())
}

fn cmd_list<S: KeyValueStorage>(
    store: &TaskStore<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    filter: Option<FilterMode>,
) -> anyhow::Result<()> {
    let mode = match filter {
        Some(mode) => mode,
        None => cfg.default_filter()?,
    };
    let view = ViewFilter::new(mode);
    let visible = view.visible(store.tasks());

    debug!(mode = %mode, visible = visible.len(), "command list");
    renderer.print_task_list(&visible, store.counts())
}

fn cmd_toggle<S: KeyValueStorage>(store: &mut TaskStore<S>, query: &str) -> anyhow::Result<()> {
    info!("command toggle");

    let Some(id) = resolve_or_report(store, query) else {
        return Ok(());
    };
    if let Some(task) = store.toggle(&id)? {
        let state = if task.done { "marked done" } else { "reopened" };
        println!("Task {} {state}.", task.id.short());
    }
    Ok(())
}

fn cmd_rename<S: KeyValueStorage>(
    store: &mut TaskStore<S>,
    query: &str,
    title: &str,
) -> anyhow::Result<()> {
    info!("command rename");

    let Some(id) = resolve_or_report(store, query) else {
        return Ok(());
    };
    let before = store.get(&id).map(|t| t.title.clone());
    if let Some(task) = store.rename(&id, title)? {
        if before.as_deref() == Some(task.title.as_str()) {
            println!("Title unchanged.");
        } else {
            println!("Renamed task {}.", task.id.short());
        }
    }
    Ok(())
}

fn cmd_remove<S: KeyValueStorage>(store: &mut TaskStore<S>, query: &str) -> anyhow::Result<()> {
    info!("command remove");

    let Some(id) = resolve_or_report(store, query) else {
        return Ok(());
    };
    if let Some(task) = store.remove(&id)? {
        println!("Deleted task {}.", task.id.short());
    }
    Ok(())
}

fn resolve_or_report<S: KeyValueStorage>(store: &TaskStore<S>, query: &str) -> Option<TaskId> {
    let id = store.resolve(query);
    if id.is_none() {
        println!("No task matches '{query}'.");
    }
    id
}
