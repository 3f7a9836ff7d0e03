/// The greeting used throughout the crate documentation.
pub const HELLO: &str = "Hello {{v:name/}}, welcome to {{b:place}}Earth{{/b:place}}.";

/// A list whose `row` block is rendered once per record and appended to `rows`.
pub const ORDERS: &str = "\
Orders for {{v:customer/}}
{{b:rows/}}{{b:row}}- {{v:item/}} x{{v:qty/}}
{{/b:row}}Total: {{v:total/}}";

/// A markup page with an escaped title and a localized greeting.
pub const PAGE: &str = "\
<html><head><title><!--v:title/--></title></head>\
<body><!-- layout: simple --><h1>{{f:lang:greeting}}Hello{{/f:lang:greeting}}</h1>\
{{a:greeting:fr}}Bonjour{{/a:greeting:fr}}{{a:greeting:de}}Hallo{{/a:greeting:de}}\
<p>{{v:body/}}</p></body></html>";

/// A data template producing a JSON object.
pub const RECORD: &str = r#"{"name": "{{v:name/}}", "note": "{{v:note}}none{{/v:note}}"}"#;

/// Item name and quantity for the `index`th order row.
pub fn order_row(index: usize) -> (String, String) {
    (format!("Item {}", index), (index % 5 + 1).to_string())
}
