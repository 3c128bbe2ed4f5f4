//! Commands every engine starts with.

use anyhow::Context;
use serde_json::Value;

use crate::command::{Command, CommandRegistry};
use crate::document::{Document, TableEdit};
use crate::CoreResult;

fn arg<'a>(args: &'a [Value], index: usize, name: &str) -> anyhow::Result<&'a Value> {
    args.get(index)
        .with_context(|| format!("missing argument '{name}'"))
}

fn arg_str<'a>(args: &'a [Value], index: usize, name: &str) -> anyhow::Result<&'a str> {
    arg(args, index, name)?
        .as_str()
        .with_context(|| format!("argument '{name}' must be a string"))
}

fn arg_usize(args: &[Value], index: usize, name: &str) -> anyhow::Result<usize> {
    let value = arg(args, index, name)?
        .as_u64()
        .with_context(|| format!("argument '{name}' must be a non-negative integer"))?;
    Ok(usize::try_from(value)?)
}

fn arg_f64(args: &[Value], index: usize, name: &str) -> anyhow::Result<f64> {
    arg(args, index, name)?
        .as_f64()
        .with_context(|| format!("argument '{name}' must be a number"))
}

fn table_command(name: &str, edit: TableEdit) -> Command<Document> {
    Command::new(name, move |doc: &mut Document, _: &[Value]| {
        doc.edit_table(edit)?;
        Ok(())
    })
    .with_query_state(Document::selection_in_table)
}

/// Registers the built-in editing, table and image commands.
pub(crate) fn register_builtins(registry: &mut CommandRegistry<Document>) -> CoreResult<()> {
    // Editing
    registry.register(Command::new("insertText", |doc: &mut Document, args: &[Value]| {
        doc.insert_text(arg_str(args, 0, "text")?)?;
        Ok(())
    }))?;
    registry.register(Command::new(
        "deleteSelection",
        |doc: &mut Document, _: &[Value]| {
            doc.delete_selection()?;
            Ok(())
        },
    ))?;
    registry.register(Command::new("setContent", |doc: &mut Document, args: &[Value]| {
        doc.set_content(arg_str(args, 0, "html")?);
        Ok(())
    }))?;
    registry.register(
        Command::new("selectAll", |doc: &mut Document, _: &[Value]| {
            doc.select_all();
            Ok(())
        })
        .with_query_value(Document::selected_text),
    )?;
    registry.register(
        Command::new("toggleEditing", |doc: &mut Document, _: &[Value]| {
            doc.set_editing(!doc.is_editing());
            Ok(())
        })
        .with_query_state(Document::is_editing),
    )?;

    // Tables
    registry.register(
        Command::new("insertTable", |doc: &mut Document, args: &[Value]| {
            let rows = arg_usize(args, 0, "rows")?;
            let cols = arg_usize(args, 1, "cols")?;
            doc.insert_table(rows, cols)?;
            Ok(())
        })
        .with_query_state(Document::selection_in_table)
        .with_query_value(|doc: &Document| {
            doc.table_dimensions()
                .map(|(rows, cols)| format!("{rows}x{cols}"))
                .unwrap_or_default()
        }),
    )?;
    registry.register(table_command("insertRowEnd", TableEdit::InsertRowEnd))?;
    registry.register(table_command("deleteRowEnd", TableEdit::DeleteRowEnd))?;
    registry.register(table_command("insertColumnEnd", TableEdit::InsertColumnEnd))?;
    registry.register(table_command("deleteColumnEnd", TableEdit::DeleteColumnEnd))?;

    // Floating images
    registry.register(
        Command::new("insertFloatingImage", |doc: &mut Document, args: &[Value]| {
            let id = doc.insert_floating_image(
                arg_str(args, 0, "src")?,
                arg_f64(args, 1, "x")?,
                arg_f64(args, 2, "y")?,
                arg_f64(args, 3, "width")?,
                arg_f64(args, 4, "height")?,
            )?;
            tracing::debug!(%id, "Inserted floating image");
            Ok(())
        })
        .with_query_value(|doc: &Document| {
            doc.floating_images()
                .last()
                .map(|image| image.id.clone())
                .unwrap_or_default()
        }),
    )?;
    registry.register(Command::new(
        "moveFloatingImage",
        |doc: &mut Document, args: &[Value]| {
            doc.move_floating_image(
                arg_str(args, 0, "id")?,
                arg_f64(args, 1, "x")?,
                arg_f64(args, 2, "y")?,
            )?;
            Ok(())
        },
    ))?;
    registry.register(Command::new(
        "resizeFloatingImage",
        |doc: &mut Document, args: &[Value]| {
            doc.resize_floating_image(
                arg_str(args, 0, "id")?,
                arg_f64(args, 1, "width")?,
                arg_f64(args, 2, "height")?,
            )?;
            Ok(())
        },
    ))?;
    registry.register(Command::new(
        "removeFloatingImage",
        |doc: &mut Document, args: &[Value]| {
            doc.remove_floating_image(arg_str(args, 0, "id")?)?;
            Ok(())
        },
    ))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> CommandRegistry<Document> {
        let mut registry = CommandRegistry::new();
        register_builtins(&mut registry).unwrap();
        registry
    }

    #[test]
    fn test_builtins_registered() {
        let registry = registry();
        for name in [
            "insertText",
            "deleteSelection",
            "setContent",
            "selectAll",
            "toggleEditing",
            "insertTable",
            "insertRowEnd",
            "deleteRowEnd",
            "insertColumnEnd",
            "deleteColumnEnd",
            "insertFloatingImage",
            "moveFloatingImage",
            "resizeFloatingImage",
            "removeFloatingImage",
        ] {
            assert!(registry.has(name), "{name} missing");
        }
    }

    #[test]
    fn test_table_query_value() {
        let registry = registry();
        let mut doc = Document::default();
        assert_eq!(registry.query_value("insertTable", &doc), "");
        registry
            .execute("insertTable", &mut doc, &[json!(2), json!(3)])
            .unwrap();
        registry.execute("insertRowEnd", &mut doc, &[]).unwrap();
        assert_eq!(registry.query_value("insertTable", &doc), "3x3");
    }

    #[test]
    fn test_missing_arguments_fail() {
        let registry = registry();
        let mut doc = Document::default();
        assert!(registry.execute("insertText", &mut doc, &[]).is_err());
        assert!(registry
            .execute("insertTable", &mut doc, &[json!(-1), json!(2)])
            .is_err());
    }

    #[test]
    fn test_toggle_editing_state() {
        let registry = registry();
        let mut doc = Document::default();
        assert!(registry.query_state("toggleEditing", &doc));
        registry.execute("toggleEditing", &mut doc, &[]).unwrap();
        assert!(!registry.query_state("toggleEditing", &doc));
    }
}
