//! Bundled plugin that keeps a live word count.

use std::cell::Cell;
use std::rc::Rc;

use folio_core::editor::CONTENT_CHANGE;
use folio_core::{Command, Document, Handler};
use folio_document::DocumentTree;
use folio_plugin::{Extension, Plugin, PluginApi};
use serde_json::Value;

/// Counts whitespace-separated words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Tracks the document's word count while active.
///
/// The count is refreshed from every `content-change` event and read
/// through the `wordCount` command's value query. While inactive the query
/// counts the document directly.
#[derive(Debug, Default)]
pub struct WordCountPlugin {
    active: Rc<Cell<bool>>,
    words: Rc<Cell<usize>>,
}

impl WordCountPlugin {
    pub const NAME: &'static str = "word-count";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Plugin for WordCountPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn install(&mut self, api: &mut PluginApi<'_>, _config: &Value) -> anyhow::Result<()> {
        self.words.set(count_words(&api.document().text()));
        Ok(())
    }

    fn activate(&mut self, api: &mut PluginApi<'_>) -> anyhow::Result<()> {
        self.words.set(count_words(&api.document().text()));
        self.active.set(true);
        Ok(())
    }

    fn deactivate(&mut self, _api: &mut PluginApi<'_>) -> anyhow::Result<()> {
        self.active.set(false);
        Ok(())
    }

    fn extends(&self) -> Vec<Extension> {
        let active = Rc::clone(&self.active);
        let words = Rc::clone(&self.words);
        let listener = Handler::new(move |args| {
            if !active.get() {
                return Ok(());
            }
            let html = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("content-change without content"))?;
            let tree = DocumentTree::parse(html);
            words.set(count_words(&tree.text_content(tree.root())));
            Ok(())
        });

        // Query-only: executing it changes nothing.
        let (active, words) = (Rc::clone(&self.active), Rc::clone(&self.words));
        let command = Command::new("wordCount", |_: &mut Document, _: &[Value]| Ok(()))
            .with_query_value(move |doc: &Document| {
                let count = if active.get() {
                    words.get()
                } else {
                    count_words(&doc.text())
                };
                count.to_string()
            });

        vec![
            Extension::command(command),
            Extension::listener(CONTENT_CHANGE, listener),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_plugin::PluginHost;
    use serde_json::json;

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("  one two\tthree\n"), 3);
    }

    #[test]
    fn test_listener_tracks_content_while_active() {
        let plugin = WordCountPlugin::new();
        let words = Rc::clone(&plugin.words);

        let mut host = PluginHost::default();
        host.register(Box::new(plugin), None).unwrap();
        host.execute("insertText", &[json!("one two")]).unwrap();
        assert_eq!(words.get(), 0);

        host.activate(WordCountPlugin::NAME).unwrap();
        assert_eq!(words.get(), 2);
        host.execute("insertText", &[json!(" three")]).unwrap();
        assert_eq!(words.get(), 3);
        assert_eq!(host.engine().query_value("wordCount"), "3");
    }

    #[test]
    fn test_word_count_is_query_only() {
        let mut host = PluginHost::default();
        host.register(Box::new(WordCountPlugin::new()), None).unwrap();
        host.execute("insertText", &[json!("a b c")]).unwrap();
        assert_eq!(host.engine().query_value("wordCount"), "3");

        let before = host.engine().state();
        host.execute("wordCount", &[]).unwrap();
        assert_eq!(host.engine().state(), before);
        assert!(host.engine_mut().undo());
        assert!(!host.engine_mut().undo());
    }
}
