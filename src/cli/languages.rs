use crate::parser::Language;

pub fn run() {
    println!("Supported languages:");
    for language in Language::all() {
        let extensions = language
            .extensions()
            .iter()
            .map(|e| format!(".{e}"))
            .collect::<Vec<_>>()
            .join(", ");
        let note = if language.has_symbol_support() {
            "symbols, imports, calls"
        } else {
            "files only (no symbol extraction)"
        };
        println!("  {:<12} {extensions}  [{note}]", language.as_str());
    }
}
