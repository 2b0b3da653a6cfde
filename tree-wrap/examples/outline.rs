use anyhow::Result;
use env_logger::Env;
use log::info;
use serde_json::json;
use tree_wrap::{
    FlattenerOptions, ItemIds, ObserverBus, RecordRef, TreeFlattener,
    TreeOptions, TreeWrapper,
};

fn print_outline(title: &str, flat: &TreeFlattener) {
    println!("{title}");
    for row in flat.items().iter() {
        let name = row
            .item
            .get("name")
            .and_then(|name| name.as_str().map(str::to_owned))
            .unwrap_or_default();
        let id = row.id.as_ref().map(ToString::to_string).unwrap_or_default();
        println!("{:indent$}- {name} [{id}]", "", indent = (row.depth - 1) * 2);
    }
    println!();
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let bus = ObserverBus::new();
    let tree = TreeWrapper::new(
        TreeOptions::new()
            .observer(bus.clone())
            .item_id(ItemIds::sequential(1))
            .on_move(|event| {
                info!(
                    "moved from index {} to index {}",
                    event.old_index, event.new_index
                );
                Ok(())
            }),
    );
    let flat = TreeFlattener::for_tree(
        &tree,
        &bus,
        FlattenerOptions::new().include_root(false),
    );

    let root = tree.wrap_json(json!({
        "items": [
            { "name": "Inbox" },
            { "name": "Projects", "items": [
                { "name": "tree-wrap", "items": [{ "name": "flattener" }] },
                { "name": "website" }
            ]},
            { "name": "Archive" }
        ]
    }))?;
    print_outline("initial", &flat);

    let projects = root
        .child(1)
        .ok_or_else(|| anyhow::anyhow!("missing projects"))?;
    let benchmarks = RecordRef::from_json(
        json!({ "name": "benchmarks" }),
        tree.children_prop(),
    )?;
    projects.add_child(1, benchmarks, None)?;
    print_outline("after add", &flat);

    let archive = root
        .child(2)
        .ok_or_else(|| anyhow::anyhow!("missing archive"))?;
    projects.move_child_to(2, &archive, 0)?;
    print_outline("after move", &flat);

    root.remove_child(0)?;
    print_outline("after remove", &flat);

    info!("{} rows in the final outline", flat.len());
    Ok(())
}
