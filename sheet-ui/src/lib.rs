//! Summary panel for the monitoring sheet, rendered with yew on WebAssembly.

#[cfg(target_arch = "wasm32")]
mod styles;

#[cfg(target_arch = "wasm32")]
mod wasm_ui {
    use crate::styles;
    use serde_wasm_bindgen::from_value;
    use sheet_core::{SummaryColumn, SummaryField, SummaryRow, SummaryView};
    use wasm_bindgen::prelude::*;
    use web_sys::{console, Document, Element, Window};
    use yew::prelude::*;

    const PLACEHOLDER: &str = "-";

    #[derive(Properties, PartialEq)]
    pub struct SummaryPanelProps {
        pub view: SummaryView,
    }

    #[function_component(SummaryPanel)]
    fn summary_panel(props: &SummaryPanelProps) -> Html {
        let view = &props.view;

        use_effect_with((), |_| {
            if let Some(window) = web_sys::window() {
                if let Some(document) = window.document() {
                    if let Err(err) = styles::ensure_styles(&document) {
                        console::error_1(&err);
                    }
                }
            }
            || ()
        });

        // Columns without a time are hidden unless the user asks for them.
        let show_empty = use_state(|| false);
        let visible: Vec<&SummaryColumn> = view
            .columns
            .iter()
            .filter(|column| *show_empty || column.taken_at != PLACEHOLDER)
            .collect();

        let on_toggle = {
            let show_empty = show_empty.clone();
            Callback::from(move |_| show_empty.set(!*show_empty))
        };

        html! {
            <div class="sheet-summary">
                <section class="summary-header">
                    <h2>{"Resumen del formulario"}</h2>
                    <dl class="summary-fields">
                        { for view.fields.iter().map(render_field) }
                    </dl>
                </section>
                <section class="summary-grid">
                    <header class="summary-toolbar">
                        <h3>{"Mediciones"}</h3>
                        <button type="button" onclick={on_toggle}>
                            { if *show_empty { "Ocultar columnas vacías" } else { "Mostrar todas las columnas" } }
                        </button>
                    </header>
                    {
                        if visible.is_empty() {
                            html! { <p class="summary-empty">{"Sin mediciones registradas."}</p> }
                        } else {
                            render_table(&view.rows, &visible)
                        }
                    }
                </section>
            </div>
        }
    }

    fn render_field(field: &SummaryField) -> Html {
        html! {
            <div class="summary-field">
                <dt>{ field.label.clone() }</dt>
                <dd class={classes!((field.value == PLACEHOLDER).then_some("is-empty"))}>
                    { field.value.clone() }
                </dd>
            </div>
        }
    }

    fn render_table(rows: &[SummaryRow], columns: &[&SummaryColumn]) -> Html {
        html! {
            <table class="summary-table">
                <thead>
                    <tr>
                        <th scope="col">{"Parámetro"}</th>
                        {
                            for columns.iter().map(|column| html! {
                                <th scope="col" data-locked={column.locked.to_string()}>
                                    { column.taken_at.clone() }
                                </th>
                            })
                        }
                    </tr>
                </thead>
                <tbody>
                    { for rows.iter().map(|row| render_row(row, columns)) }
                </tbody>
            </table>
        }
    }

    fn render_row(row: &SummaryRow, columns: &[&SummaryColumn]) -> Html {
        let label = match &row.unit {
            Some(unit) => format!("{} ({unit})", row.label),
            None => row.label.clone(),
        };

        html! {
            <tr>
                <th scope="row">{ label }</th>
                {
                    for columns.iter().map(|column| {
                        let text = row
                            .cells
                            .iter()
                            .find(|cell| cell.column == column.index)
                            .map(|cell| cell.text.clone())
                            .unwrap_or_else(|| PLACEHOLDER.to_string());
                        html! { <td>{ text }</td> }
                    })
                }
            </tr>
        }
    }

    #[wasm_bindgen]
    pub fn mount_summary_view(selector: &str, view: JsValue) -> Result<(), JsValue> {
        let window: Window = web_sys::window().ok_or_else(|| JsValue::from_str("Sin window"))?;
        let document: Document = window
            .document()
            .ok_or_else(|| JsValue::from_str("Sin acceso a document"))?;

        let target: Element = document
            .query_selector(selector)
            .map_err(|err| JsValue::from_str(&format!("Selector inválido: {err:?}")))?
            .ok_or_else(|| JsValue::from_str("No se encontró el elemento del selector"))?;

        let view: SummaryView = from_value(view)?;

        yew::Renderer::<SummaryPanel>::with_root_and_props(target, SummaryPanelProps { view })
            .render();
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_ui::mount_summary_view;

#[cfg(not(target_arch = "wasm32"))]
pub fn mount_summary_view(_: &str, _: wasm_bindgen::JsValue) -> Result<(), wasm_bindgen::JsValue> {
    Err(wasm_bindgen::JsValue::from_str(
        "sheet-ui solo se puede compilar para wasm32",
    ))
}
