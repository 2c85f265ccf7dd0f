use crate::error::ReconcileResult;
use crate::hooks::RenderContext;
use crate::output::Handler;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

/// Component props
pub type Props = BTreeMap<String, Value>;

type RenderFn = dyn Fn(&mut RenderContext<'_>, &Props) -> ReconcileResult<Element>;

/// A component: a named render function.
///
/// Two components are the same type only if they share the same render
/// function allocation, so clones of one `Component` match each other.
#[derive(Clone)]
pub struct Component {
    name: Rc<str>,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new<F>(name: &str, render: F) -> Self
    where
        F: Fn(&mut RenderContext<'_>, &Props) -> ReconcileResult<Element> + 'static,
    {
        Self {
            name: Rc::from(name),
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn same_type(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }

    pub(crate) fn call(&self, cx: &mut RenderContext<'_>, props: &Props) -> ReconcileResult<Element> {
        (self.render)(cx, props)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

/// Children of an intrinsic element
#[derive(Debug, Clone, Default)]
pub enum Children {
    #[default]
    Empty,
    Text(String),
    Nodes(Vec<Element>),
}

/// Element description returned by a component
#[derive(Clone)]
pub enum Element {
    /// Host element
    Intrinsic {
        tag: String,
        attributes: HashMap<String, String>,
        children: Children,
        on_click: Option<Handler>,
    },

    /// Nested component instance
    Component { component: Component, props: Props },
}

impl Element {
    pub fn intrinsic(tag: impl Into<String>) -> Self {
        Element::Intrinsic {
            tag: tag.into(),
            attributes: HashMap::new(),
            children: Children::Empty,
            on_click: None,
        }
    }

    pub fn component(component: &Component) -> Self {
        Element::Component {
            component: component.clone(),
            props: Props::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Element::Intrinsic {
            ref mut attributes, ..
        } = self
        {
            attributes.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        if let Element::Intrinsic {
            ref mut children, ..
        } = self
        {
            *children = Children::Text(text.into());
        }
        self
    }

    /// Append a child element. Replaces literal text children.
    pub fn with_child(mut self, child: Element) -> Self {
        if let Element::Intrinsic {
            ref mut children, ..
        } = self
        {
            match children {
                Children::Nodes(nodes) => nodes.push(child),
                _ => *children = Children::Nodes(vec![child]),
            }
        }
        self
    }

    pub fn with_children(self, new_children: impl IntoIterator<Item = Element>) -> Self {
        new_children
            .into_iter()
            .fold(self, |element, child| element.with_child(child))
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Element::Component { ref mut props, .. } = self {
            props.insert(key.into(), value.into());
        }
        self
    }

    pub fn on_click<F>(mut self, handler: F) -> Self
    where
        F: Fn() -> ReconcileResult<()> + 'static,
    {
        if let Element::Intrinsic {
            ref mut on_click, ..
        } = self
        {
            *on_click = Some(Rc::new(handler));
        }
        self
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Intrinsic {
                tag,
                attributes,
                children,
                on_click,
            } => f
                .debug_struct("Intrinsic")
                .field("tag", tag)
                .field("attributes", attributes)
                .field("children", children)
                .field("on_click", &on_click.is_some())
                .finish(),
            Element::Component { component, props } => f
                .debug_struct("Component")
                .field("component", component)
                .field("props", props)
                .finish(),
        }
    }
}
