//! Property tests for the parse-compile-render path.

use proptest::prelude::*;
use std::sync::Arc;
use stencil::{Dialect, compile_str};

// =============================================================================
// Strategies
// =============================================================================

/// Text with no delimiter or escape characters in it.
fn literal_text() -> impl Strategy<Value = String> {
    "[^{}\\\\<]{0,120}"
}

fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn literal_text_renders_unchanged(text in literal_text()) {
        for dialect in Dialect::ALL {
            let compiled = Arc::new(compile_str("literal", &text, dialect).unwrap());
            let rendered = compiled.instantiate().render_to_string().unwrap();
            prop_assert_eq!(&rendered, &text);
            prop_assert!(compiled.identifiers().is_empty());
        }
    }

    #[test]
    fn defaults_render_when_unbound(
        before in literal_text(),
        id in identifier(),
        default in literal_text(),
        after in literal_text(),
    ) {
        let source = format!("{before}{{{{b:{id}}}}}{default}{{{{/b:{id}}}}}{after}");
        let compiled = Arc::new(compile_str("defaults", &source, Dialect::Text).unwrap());
        let template = compiled.instantiate();
        prop_assert_eq!(
            template.render_to_string().unwrap(),
            format!("{before}{default}{after}")
        );
        prop_assert_eq!(template.default_content(&id).unwrap(), Some(default.as_str()));
    }

    #[test]
    fn bound_values_are_written_verbatim(
        id in identifier(),
        value in any::<String>(),
    ) {
        let source = format!("[{{{{v:{id}/}}}}]");
        let compiled = Arc::new(compile_str("values", &source, Dialect::Text).unwrap());
        let mut template = compiled.instantiate();
        template.set_value(&id, value.clone()).unwrap();
        prop_assert_eq!(template.render_to_string().unwrap(), format!("[{value}]"));
        prop_assert_eq!(template.get_value(&id).unwrap(), value);
    }

    #[test]
    fn encoded_markup_values_contain_no_markup(value in any::<String>()) {
        let compiled = Arc::new(compile_str("page", "<p>{{v:body/}}</p>", Dialect::Markup).unwrap());
        let mut template = compiled.instantiate();
        template.set_value_encoded("body", &value).unwrap();
        let rendered = template.render_to_string().unwrap();
        let inner = &rendered["<p>".len()..rendered.len() - "</p>".len()];
        prop_assert!(!inner.contains(['<', '>', '"', '\'']));
    }

    #[test]
    fn escaped_tags_are_literal(id in identifier(), text in literal_text()) {
        let source = format!("{text}\\{{{{v:{id}/}}}}");
        let compiled = Arc::new(compile_str("escaped", &source, Dialect::Text).unwrap());
        prop_assert!(compiled.identifiers().is_empty());
        prop_assert_eq!(
            compiled.instantiate().render_to_string().unwrap(),
            format!("{text}{{{{v:{id}/}}}}")
        );
    }
}
