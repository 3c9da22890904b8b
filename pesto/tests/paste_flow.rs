//! Copy and paste from history back to the clipboard.

use std::sync::Arc;
use std::time::Duration;

use pesto::pasteboard::RichTextData;
use pesto::selection::{PASTE_KEYSTROKE_DELAY, SEARCH_DEBOUNCE};
use pesto::{
    Engine, HistoryEntry, MemoryPasteboard, PasteOutcome, PasteSettings, PestoError,
    RawClipboardContent, Representation, Settings, TickOutcome,
};
use tokio::runtime::Handle;

fn engine() -> (Engine, Arc<MemoryPasteboard>) {
    let port = Arc::new(MemoryPasteboard::new());
    let engine = Engine::open_in_memory(port.clone(), Settings::default(), Handle::current()).unwrap();
    (engine, port)
}

async fn capture_rich(engine: &Engine, port: &MemoryPasteboard, text: &str) -> HistoryEntry {
    port.set_content(RawClipboardContent {
        rich_text: Some(RichTextData {
            data: format!("{{\\rtf1 {}}}", text).into_bytes(),
            rendered: Some(text.to_string()),
        }),
        plain_text: Some(text.to_string()),
        ..Default::default()
    });
    let TickOutcome::Captured(outcome) = engine.poller().tick().await else {
        panic!("rich text should be captured");
    };
    engine.store().get(outcome.id()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_plain_text_paste_writes_only_plain() {
    let (engine, port) = engine();
    let entry = capture_rich(&engine, &port, "Formatted").await;
    engine.selection().refresh().unwrap();

    let outcome = engine.selection().paste(entry.id, true).unwrap();
    assert_eq!(outcome, PasteOutcome::KeystrokeScheduled);
    assert_eq!(
        port.writes().last().unwrap(),
        &vec![Representation::PlainText("Formatted".into())]
    );

    tokio::time::sleep(PASTE_KEYSTROKE_DELAY + Duration::from_millis(5)).await;
    assert_eq!(port.keystrokes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rich_paste_writes_rich_then_plain() {
    let (engine, port) = engine();
    let entry = capture_rich(&engine, &port, "Bold").await;

    engine.selection().paste(entry.id, false).unwrap();
    let written = port.writes().last().cloned().unwrap();
    assert_eq!(written.len(), 2);
    assert!(matches!(written[0], Representation::RichText(_)));
    assert_eq!(written[1], Representation::PlainText("Bold".into()));
}

#[tokio::test]
async fn test_copy_back_is_recaptured_as_duplicate() {
    let (engine, port) = engine();
    port.set_text("older");
    engine.poller().tick().await;
    port.set_text("newer");
    engine.poller().tick().await;
    engine.selection().refresh().unwrap();

    let older = engine.selection().visible_items()[1].id;
    engine.selection().copy(older).unwrap();

    // The write bumps the clipboard version; the poller sees our own content
    let outcome = engine.poller().tick().await;
    assert!(matches!(outcome, TickOutcome::Captured(ref o) if o.is_duplicate() && o.id() == older));
    assert_eq!(engine.store().count().unwrap(), 2);
    assert_eq!(engine.store().fetch_all().unwrap()[0].id, older);
}

#[tokio::test(start_paused = true)]
async fn test_paste_without_permission_still_writes() {
    let (engine, port) = engine();
    port.set_permission(false);
    port.set_text("x");
    engine.poller().tick().await;
    engine.selection().refresh().unwrap();

    let outcome = engine.selection().paste_at_index(0, false).unwrap();
    assert_eq!(outcome, Some(PasteOutcome::PermissionDenied));
    assert_eq!(port.writes().len(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(port.keystrokes(), 0);
}

#[tokio::test]
async fn test_paste_missing_entry_is_not_found() {
    let (engine, port) = engine();
    let ghost = pesto::EntryId::new();
    assert_eq!(engine.selection().paste(ghost, false), Err(PestoError::NotFound(ghost)));
    assert!(port.writes().is_empty());
}

#[tokio::test]
async fn test_oversized_image_cannot_be_written_back() {
    let mut settings = Settings::default();
    settings.capture.max_image_bytes = 4;
    let port = Arc::new(MemoryPasteboard::new());
    let engine = Engine::open_in_memory(port.clone(), settings, Handle::current()).unwrap();

    port.set_content(RawClipboardContent {
        images: vec![pesto::pasteboard::EncodedImage {
            encoding: pesto::pasteboard::ImageEncoding::Png,
            data: vec![0u8; 32],
        }],
        ..Default::default()
    });
    let TickOutcome::Captured(outcome) = engine.poller().tick().await else {
        panic!("image should be captured");
    };

    assert!(matches!(
        engine.selection().copy(outcome.id()),
        Err(PestoError::PasteboardWriteFailed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_activate_honors_paste_settings() {
    let (engine, port) = engine();
    capture_rich(&engine, &port, "styled").await;
    engine.selection().refresh().unwrap();

    let copy_only = PasteSettings::default();
    assert_eq!(engine.selection().activate(0, &copy_only).unwrap(), None);
    assert_eq!(port.writes().last().unwrap().len(), 2);

    let paste_plain = PasteSettings { paste_automatically: true, plain_text_mode: true };
    assert_eq!(
        engine.selection().activate(0, &paste_plain).unwrap(),
        Some(PasteOutcome::KeystrokeScheduled)
    );
    assert_eq!(
        port.writes().last().unwrap(),
        &vec![Representation::PlainText("styled".into())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_search_then_paste_first_result() {
    let (engine, port) = engine();
    for t in ["alpha", "beta", "Alphabet"] {
        port.set_text(t);
        engine.poller().tick().await;
    }
    engine.selection().refresh().unwrap();

    engine.selection().set_query("ALPHA");
    tokio::time::sleep(SEARCH_DEBOUNCE + Duration::from_millis(5)).await;

    let visible: Vec<String> = engine
        .selection()
        .visible_items()
        .iter()
        .map(|e| e.display_text())
        .collect();
    assert_eq!(visible, vec!["Alphabet", "alpha"]);
    assert_eq!(engine.selection().selected_index(), None);

    engine.selection().move_selection(1);
    engine.selection().paste_selected(false).unwrap();
    assert_eq!(
        port.writes().last().unwrap(),
        &vec![Representation::PlainText("Alphabet".into())]
    );
}
