#![cfg(target_arch = "wasm32")]

use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Node};

const STYLE_TAG_SELECTOR: &str = "style[data-sheet-ui]";

/// Default CSS for the summary panel, with tokens the host page may override.
pub const DEFAULT_STYLES: &str = r#"
:root {
  --sheet-font-family: 'Inter', system-ui, -apple-system, 'Segoe UI', sans-serif;
  --sheet-bg: #ffffff;
  --sheet-border: rgba(148, 163, 184, 0.35);
  --sheet-radius: 12px;
  --sheet-text: #1f2933;
  --sheet-muted: #52606d;
  --sheet-heading: #11181c;
  --sheet-surface: #f8fafc;
  --sheet-locked-bg: rgba(71, 84, 103, 0.08);
  --sheet-accent: #2563eb;
}

.sheet-summary {
  font-family: var(--sheet-font-family);
  background: var(--sheet-bg);
  color: var(--sheet-text);
  border: 1px solid var(--sheet-border);
  border-radius: var(--sheet-radius);
  display: flex;
  flex-direction: column;
  gap: 20px;
  padding: 20px;
}

.summary-header h2,
.summary-toolbar h3 {
  margin: 0;
  color: var(--sheet-heading);
}

.summary-fields {
  display: grid;
  grid-template-columns: repeat(auto-fill, minmax(220px, 1fr));
  gap: 10px 18px;
  margin: 14px 0 0;
}

.summary-field dt {
  font-size: 0.75rem;
  text-transform: uppercase;
  letter-spacing: 0.04em;
  color: var(--sheet-muted);
}

.summary-field dd {
  margin: 2px 0 0;
  font-weight: 600;
}

.summary-field dd.is-empty {
  color: var(--sheet-muted);
  font-weight: 400;
}

.summary-toolbar {
  display: flex;
  align-items: center;
  justify-content: space-between;
  margin-bottom: 10px;
}

.summary-toolbar button {
  border: 1px solid var(--sheet-border);
  background: var(--sheet-surface);
  border-radius: 999px;
  padding: 4px 12px;
  cursor: pointer;
  color: var(--sheet-accent);
}

.summary-table {
  width: 100%;
  border-collapse: collapse;
  font-variant-numeric: tabular-nums;
}

.summary-table th,
.summary-table td {
  border: 1px solid var(--sheet-border);
  padding: 6px 8px;
  text-align: center;
}

.summary-table tbody th {
  text-align: left;
  font-weight: 500;
  background: var(--sheet-surface);
}

.summary-table thead th[data-locked="true"] {
  background: var(--sheet-locked-bg);
}

.summary-empty {
  color: var(--sheet-muted);
  font-style: italic;
}

@media print {
  .summary-toolbar button {
    display: none;
  }
}
"#;

pub fn ensure_styles(document: &Document) -> Result<(), JsValue> {
    if document.query_selector(STYLE_TAG_SELECTOR)?.is_some() {
        return Ok(());
    }

    let head = document
        .head()
        .ok_or_else(|| JsValue::from_str("El documento no tiene <head>"))?;

    let style_el = document.create_element("style")?;
    style_el.set_attribute("data-sheet-ui", "v1")?;
    style_el.set_text_content(Some(DEFAULT_STYLES));
    head.append_child(&style_el.clone().dyn_into::<Node>()?)?;

    Ok(())
}
