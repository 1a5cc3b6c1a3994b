//! Languages available before any plugin loads.

use nimbus_plugin_api::{CompilerConfiguration, LanguageConfiguration, SyntaxConfiguration};

fn c_like_syntax(keywords: &[&str]) -> SyntaxConfiguration {
    SyntaxConfiguration {
        keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        operators: ["=", "==", "!=", "<", ">", "<=", ">=", "+", "-", "*", "/", "%", "&&", "||", "!"]
            .iter()
            .map(|o| (*o).to_string())
            .collect(),
        brackets: vec![
            ("{".to_string(), "}".to_string()),
            ("[".to_string(), "]".to_string()),
            ("(".to_string(), ")".to_string()),
        ],
        line_comment: Some("//".to_string()),
        block_comment: Some(("/*".to_string(), "*/".to_string())),
    }
}

/// Returns the built-in language table.
#[must_use]
pub fn builtin_languages() -> Vec<LanguageConfiguration> {
    vec![
        LanguageConfiguration::new("javascript")
            .with_aliases(["JavaScript", "js"])
            .with_extensions([".js", ".mjs", ".cjs"])
            .with_compiler(CompilerConfiguration::new("node", ["${file}"]))
            .with_syntax(c_like_syntax(&[
                "const", "let", "var", "function", "return", "if", "else", "for", "while", "class", "import", "export",
            ])),
        LanguageConfiguration::new("typescript")
            .with_aliases(["TypeScript", "ts"])
            .with_extensions([".ts", ".mts"])
            .with_compiler(CompilerConfiguration::new("ts-node", ["${file}"]))
            .with_syntax(c_like_syntax(&[
                "const", "let", "function", "return", "if", "else", "interface", "type", "class", "import", "export",
            ])),
        LanguageConfiguration::new("python")
            .with_aliases(["Python", "py"])
            .with_extensions([".py"])
            .with_compiler(CompilerConfiguration::new("python3", ["${file}"]))
            .with_syntax(SyntaxConfiguration {
                keywords: ["def", "class", "return", "if", "elif", "else", "for", "while", "import", "from", "with"]
                    .iter()
                    .map(|k| (*k).to_string())
                    .collect(),
                line_comment: Some("#".to_string()),
                ..SyntaxConfiguration::default()
            }),
        LanguageConfiguration::new("c")
            .with_aliases(["C"])
            .with_extensions([".c", ".h"])
            .with_compiler(CompilerConfiguration {
                output_extension: Some(String::new()),
                ..CompilerConfiguration::new("gcc", ["${file}", "-o", "${fileBasenameNoExtension}"])
            })
            .with_syntax(c_like_syntax(&["int", "char", "void", "struct", "return", "if", "else", "for", "while"])),
        LanguageConfiguration::new("cpp")
            .with_aliases(["C++", "cpp"])
            .with_extensions([".cpp", ".cc", ".cxx", ".hpp"])
            .with_compiler(CompilerConfiguration {
                output_extension: Some(String::new()),
                ..CompilerConfiguration::new("g++", ["${file}", "-o", "${fileBasenameNoExtension}"])
            })
            .with_syntax(c_like_syntax(&[
                "int", "auto", "class", "namespace", "template", "return", "if", "else", "for", "while",
            ])),
        LanguageConfiguration::new("java")
            .with_aliases(["Java"])
            .with_extensions([".java"])
            .with_compiler(CompilerConfiguration::new("java", ["${file}"]))
            .with_syntax(c_like_syntax(&["class", "public", "private", "static", "void", "return", "new"])),
        LanguageConfiguration::new("rust")
            .with_aliases(["Rust", "rs"])
            .with_extensions([".rs"])
            .with_compiler(CompilerConfiguration {
                output_extension: Some(String::new()),
                ..CompilerConfiguration::new("rustc", ["${file}", "-o", "${fileBasenameNoExtension}"])
            })
            .with_syntax(c_like_syntax(&["fn", "let", "mut", "struct", "enum", "impl", "trait", "match", "use"])),
        LanguageConfiguration::new("go")
            .with_aliases(["Go", "golang"])
            .with_extensions([".go"])
            .with_compiler(CompilerConfiguration::new("go", ["run", "${file}"]))
            .with_syntax(c_like_syntax(&["func", "package", "import", "var", "type", "struct", "return", "go"])),
        LanguageConfiguration::new("plaintext")
            .with_aliases(["Plain Text", "text"])
            .with_extensions([".txt"]),
        LanguageConfiguration::new("markdown")
            .with_aliases(["Markdown", "md"])
            .with_extensions([".md", ".markdown"]),
        LanguageConfiguration::new("json")
            .with_aliases(["JSON"])
            .with_extensions([".json"]),
    ]
}
