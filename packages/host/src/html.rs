use crate::memory_host::HostElement;

/// Options for HTML serialisation
#[derive(Debug, Clone)]
pub struct HtmlOptions {
    /// One element per line, indented by depth
    pub pretty: bool,
    /// Indentation string
    pub indent: String,
    /// Emit `data-host-id` attributes
    pub include_ids: bool,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: "  ".to_string(),
            include_ids: false,
        }
    }
}

struct Context<'a> {
    options: &'a HtmlOptions,
    depth: usize,
    buffer: String,
}

impl<'a> Context<'a> {
    fn new(options: &'a HtmlOptions) -> Self {
        Self {
            options,
            depth: 0,
            buffer: String::new(),
        }
    }

    fn add(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn add_line(&mut self, text: &str) {
        if self.options.pretty {
            for _ in 0..self.depth {
                self.buffer.push_str(&self.options.indent);
            }
        }
        self.add(text);
        if self.options.pretty {
            self.add("\n");
        }
    }

    fn indent(&mut self) {
        self.depth += 1;
    }

    fn dedent(&mut self) {
        if self.depth > 0 {
            self.depth -= 1;
        }
    }

    fn get_output(self) -> String {
        self.buffer
    }
}

/// Serialise a host element tree to HTML
pub fn to_html(root: &HostElement, options: &HtmlOptions) -> String {
    let mut ctx = Context::new(options);
    write_element(root, &mut ctx);
    ctx.get_output()
}

fn write_element(element: &HostElement, ctx: &mut Context<'_>) {
    let mut open = format!("<{}", element.tag);
    if ctx.options.include_ids {
        open.push_str(&format!(" data-host-id=\"{}\"", element.id.0));
    }
    for (name, value) in &element.attributes {
        open.push_str(&format!(" {}=\"{}\"", name, escape_attr(value)));
    }
    open.push('>');

    let close = format!("</{}>", element.tag);

    if element.children.is_empty() {
        let text = element.text.as_deref().map(escape_html).unwrap_or_default();
        ctx.add_line(&format!("{}{}{}", open, text, close));
        return;
    }

    ctx.add_line(&open);
    ctx.indent();
    if let Some(text) = &element.text {
        ctx.add_line(&escape_html(text));
    }
    for child in &element.children {
        write_element(child, ctx);
    }
    ctx.dedent();
    ctx.add_line(&close);
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(text: &str) -> String {
    escape_html(text).replace('"', "&quot;")
}
