use serde::Serialize;

use super::{init_store, parse_id};
use crate::config::StoreConfig;
use crate::policy::Caller;
use crate::store::Store;
use crate::types::{CascadeReport, File, WorkspaceTree};

fn trash_suffix(marker: Option<&str>) -> String {
    match marker {
        Some(marker) => format!("  [trash: {marker}]"),
        None => String::new(),
    }
}

fn file_label(file: &File) -> String {
    format!("{} {}{}", file.icon_id, file.title, trash_suffix(file.in_trash.as_deref()))
}

fn render_tree(tree: &WorkspaceTree) -> Vec<String> {
    let ws = &tree.workspace;
    let mut lines = vec![format!(
        "{} {}  ({}){}",
        ws.icon_id,
        ws.title,
        ws.id,
        trash_suffix(ws.in_trash.as_deref())
    )];

    let total = tree.folders.len() + tree.files.len();
    let mut index = 0;

    for node in &tree.folders {
        index += 1;
        let last = index == total;
        lines.push(format!(
            "{}{} {}{}",
            if last { "└── " } else { "├── " },
            node.folder.icon_id,
            node.folder.title,
            trash_suffix(node.folder.in_trash.as_deref())
        ));

        let stem = if last { "    " } else { "│   " };
        for (i, file) in node.files.iter().enumerate() {
            let branch = if i + 1 == node.files.len() { "└── " } else { "├── " };
            lines.push(format!("{stem}{branch}{}", file_label(file)));
        }
    }

    for file in &tree.files {
        index += 1;
        let branch = if index == total { "└── " } else { "├── " };
        lines.push(format!("{branch}{}", file_label(file)));
    }

    lines
}

pub fn run_tree(config: &StoreConfig, workspace: &str, json: bool) -> anyhow::Result<()> {
    let store = init_store(config)?;
    let id = parse_id(workspace, "workspace")?;

    let tree = match store.workspace_tree(&Caller::Service, id) {
        Err(crate::error::Error::NotFound) => anyhow::bail!("Workspace '{id}' not found"),
        other => other?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
        return Ok(());
    }

    for line in render_tree(&tree) {
        println!("{line}");
    }
    Ok(())
}

#[derive(Serialize)]
struct DeleteOutput {
    workspace_id: String,
    deleted: bool,
    #[serde(flatten)]
    report: CascadeReport,
}

pub fn run_delete_workspace(
    config: &StoreConfig,
    workspace: &str,
    yes: bool,
    json: bool,
) -> anyhow::Result<()> {
    let store = init_store(config)?;
    let id = parse_id(workspace, "workspace")?;

    let caller = Caller::Service;
    let Some(ws) = store.get_workspace(&caller, id)? else {
        anyhow::bail!("Workspace '{id}' not found");
    };

    let report = if yes {
        store.delete_workspace(&caller, id)?
    } else {
        let tree = store.workspace_tree(&caller, id)?;
        CascadeReport {
            workspaces: 1,
            folders: tree.folders.len(),
            files: tree.files.len() + tree.folders.iter().map(|n| n.files.len()).sum::<usize>(),
        }
    };

    if json {
        let output = DeleteOutput {
            workspace_id: id.to_string(),
            deleted: yes,
            report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if yes {
        println!(
            "Deleted workspace '{}' ({} folders, {} files)",
            ws.title, report.folders, report.files
        );
    } else {
        println!(
            "Would delete workspace '{}' ({} folders, {} files). Re-run with --yes to delete.",
            ws.title, report.folders, report.files
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::types::{Folder, FolderNode, Workspace};

    #[test]
    fn test_render_tree_branches() {
        let ws = Workspace::new(Uuid::new_v4(), "Notes", "W");
        let folder = Folder::new(ws.id, "Drafts", "F");
        let inside = File::new(ws.id, Some(folder.id), "intro", "x");
        let mut loose = File::new(ws.id, None, "scratch", "x");
        loose.in_trash = Some("Deleted by bob".to_string());

        let tree = WorkspaceTree {
            workspace: ws.clone(),
            folders: vec![FolderNode {
                folder,
                files: vec![inside],
            }],
            files: vec![loose],
        };

        let lines = render_tree(&tree);
        assert_eq!(lines[0], format!("W Notes  ({})", ws.id));
        assert_eq!(lines[1], "├── F Drafts");
        assert_eq!(lines[2], "│   └── x intro");
        assert_eq!(lines[3], "└── x scratch  [trash: Deleted by bob]");
    }
}
