//! Plain-text rendering of language feature results

use crate::lsp::LspFeature;
use lsp_types::*;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Render a raw feature result. Payloads that do not match the expected
/// LSP shape are pretty-printed as JSON instead.
pub fn render(feature: LspFeature, payload: &Value) -> String {
    let rendered = match feature {
        LspFeature::GotoDefinition => parse::<Option<GotoDefinitionResponse>>(payload).map(|r| {
            r.map(format_definition_response)
                .unwrap_or_else(|| "No definitions found".to_string())
        }),
        LspFeature::FindReferences => parse::<Option<Vec<Location>>>(payload)
            .map(|r| format_locations(r.unwrap_or_default())),
        LspFeature::Hover => parse::<Option<Hover>>(payload).map(|r| {
            r.map(format_hover)
                .unwrap_or_else(|| "No hover information available".to_string())
        }),
        LspFeature::DocumentSymbols => parse::<Option<DocumentSymbolResponse>>(payload).map(|r| {
            r.map(format_document_symbols)
                .unwrap_or_else(|| "No symbols found".to_string())
        }),
        LspFeature::WorkspaceSymbols => parse::<Option<WorkspaceSymbolResponse>>(payload).map(|r| {
            r.map(format_workspace_symbols)
                .unwrap_or_else(|| "No symbols found".to_string())
        }),
        LspFeature::Diagnostics => {
            parse::<PublishDiagnosticsParams>(payload).map(|p| format_diagnostics(p.diagnostics))
        }
    };

    rendered.unwrap_or_else(|| {
        serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
    })
}

fn parse<T: DeserializeOwned>(payload: &Value) -> Option<T> {
    serde_json::from_value(payload.clone()).ok()
}

fn format_definition_response(response: GotoDefinitionResponse) -> String {
    match response {
        GotoDefinitionResponse::Scalar(location) => format_location(&location),
        GotoDefinitionResponse::Array(locations) => {
            if locations.is_empty() {
                "No definitions found".to_string()
            } else {
                locations
                    .iter()
                    .map(format_location)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        GotoDefinitionResponse::Link(links) => {
            if links.is_empty() {
                "No definitions found".to_string()
            } else {
                links
                    .iter()
                    .map(|link| {
                        format!(
                            "{}:{}:{}",
                            display_uri(&link.target_uri),
                            link.target_selection_range.start.line + 1,
                            link.target_selection_range.start.character + 1
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    }
}

fn display_uri(uri: &Url) -> String {
    match uri.to_file_path() {
        Ok(path) => path.display().to_string(),
        Err(()) => uri.to_string(),
    }
}

fn format_location(location: &Location) -> String {
    format!(
        "{}:{}:{}",
        display_uri(&location.uri),
        location.range.start.line + 1,
        location.range.start.character + 1
    )
}

fn format_locations(locations: Vec<Location>) -> String {
    if locations.is_empty() {
        return "No references found".to_string();
    }

    let formatted = locations
        .iter()
        .map(format_location)
        .collect::<Vec<_>>()
        .join("\n");

    format!("Found {} reference(s):\n{}", locations.len(), formatted)
}

fn format_hover(hover: Hover) -> String {
    match hover.contents {
        HoverContents::Scalar(content) => format_marked_string(content),
        HoverContents::Array(contents) => contents
            .into_iter()
            .map(format_marked_string)
            .collect::<Vec<_>>()
            .join("\n\n"),
        HoverContents::Markup(content) => content.value,
    }
}

fn format_marked_string(content: MarkedString) -> String {
    match content {
        MarkedString::String(s) => s,
        MarkedString::LanguageString(ls) => format!("```{}\n{}\n```", ls.language, ls.value),
    }
}

fn format_document_symbols(response: DocumentSymbolResponse) -> String {
    match response {
        DocumentSymbolResponse::Flat(symbols) => {
            if symbols.is_empty() {
                return "No symbols found".to_string();
            }

            let mut output = format!("Found {} symbol(s):\n\n", symbols.len());
            for symbol in symbols {
                output.push_str(&format!(
                    "- {} ({:?}) at {}:{}\n",
                    symbol.name,
                    symbol.kind,
                    symbol.location.range.start.line + 1,
                    symbol.location.range.start.character + 1
                ));
            }
            output
        }
        DocumentSymbolResponse::Nested(symbols) => {
            if symbols.is_empty() {
                return "No symbols found".to_string();
            }

            let mut output = String::from("Document outline:\n\n");
            for symbol in &symbols {
                format_document_symbol(symbol, 0, &mut output);
            }
            output
        }
    }
}

fn format_document_symbol(symbol: &DocumentSymbol, depth: usize, output: &mut String) {
    output.push_str(&format!(
        "{}- {} ({:?}) at {}:{}\n",
        "  ".repeat(depth),
        symbol.name,
        symbol.kind,
        symbol.selection_range.start.line + 1,
        symbol.selection_range.start.character + 1
    ));

    for child in symbol.children.iter().flatten() {
        format_document_symbol(child, depth + 1, output);
    }
}

fn format_workspace_symbols(response: WorkspaceSymbolResponse) -> String {
    let entries: Vec<(String, SymbolKind, String, Option<String>)> = match response {
        WorkspaceSymbolResponse::Flat(symbols) => symbols
            .into_iter()
            .map(|s| {
                let location = format_location(&s.location);
                (s.name, s.kind, location, s.container_name)
            })
            .collect(),
        WorkspaceSymbolResponse::Nested(symbols) => symbols
            .into_iter()
            .map(|s| {
                let location = match &s.location {
                    OneOf::Left(location) => format_location(location),
                    OneOf::Right(location) => display_uri(&location.uri),
                };
                (s.name, s.kind, location, s.container_name)
            })
            .collect(),
    };

    if entries.is_empty() {
        return "No symbols found".to_string();
    }

    let mut output = format!("Found {} symbol(s):\n\n", entries.len());
    for (name, kind, location, container) in entries {
        output.push_str(&format!("- {} ({:?}) at {}\n", name, kind, location));
        if let Some(container) = container {
            output.push_str(&format!("  in: {}\n", container));
        }
    }
    output
}

fn severity_label(severity: Option<DiagnosticSeverity>) -> &'static str {
    match severity {
        Some(DiagnosticSeverity::ERROR) => "ERROR",
        Some(DiagnosticSeverity::WARNING) => "WARNING",
        Some(DiagnosticSeverity::INFORMATION) => "INFO",
        Some(DiagnosticSeverity::HINT) => "HINT",
        None | Some(_) => "UNKNOWN",
    }
}

fn format_diagnostics(diagnostics: Vec<Diagnostic>) -> String {
    if diagnostics.is_empty() {
        return "No diagnostics found (no errors or warnings)".to_string();
    }

    let count = |wanted: DiagnosticSeverity| {
        diagnostics
            .iter()
            .filter(|d| d.severity == Some(wanted))
            .count()
    };

    let mut output = format!(
        "Found {} diagnostic(s): {} error(s), {} warning(s), {} info(s), {} hint(s)\n\n",
        diagnostics.len(),
        count(DiagnosticSeverity::ERROR),
        count(DiagnosticSeverity::WARNING),
        count(DiagnosticSeverity::INFORMATION),
        count(DiagnosticSeverity::HINT)
    );

    for diagnostic in &diagnostics {
        let source = diagnostic
            .source
            .as_ref()
            .map(|s| format!("[{}] ", s))
            .unwrap_or_default();

        output.push_str(&format!(
            "{}{} at line {}:{}-{}:{}: {}\n",
            source,
            severity_label(diagnostic.severity),
            diagnostic.range.start.line + 1,
            diagnostic.range.start.character + 1,
            diagnostic.range.end.line + 1,
            diagnostic.range.end.character + 1,
            diagnostic.message
        ));

        for info in diagnostic.related_information.iter().flatten() {
            output.push_str(&format!(
                "  Related: {} at {}\n",
                info.message,
                format_location(&info.location)
            ));
        }
    }

    output
}
