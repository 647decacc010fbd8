use crate::driver::traits::Bounds;
use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One `<node>` of a `uiautomator dump` hierarchy
#[derive(Debug, Clone, Default)]
pub struct UiNode {
    /// Position in document order
    pub index: usize,
    pub parent: Option<usize>,
    pub class: String,
    pub text: String,
    pub resource_id: String,
    pub content_desc: String,
    pub package: String,
    pub bounds: Bounds,
    pub checkable: bool,
    pub checked: bool,
    pub clickable: bool,
    pub enabled: bool,
    pub focusable: bool,
    pub focused: bool,
    pub scrollable: bool,
    pub long_clickable: bool,
    pub selected: bool,
    pub visible_to_user: bool,
}

impl UiNode {
    /// Read an attribute by dump name (`resource-id`) or query name (`resourceId`)
    pub fn attribute(&self, name: &str) -> Option<String> {
        let flag = |b: bool| Some(b.to_string());
        match name {
            "text" => Some(self.text.clone()),
            "resource-id" | "resourceId" | "resourceName" => Some(self.resource_id.clone()),
            "class" | "className" => Some(self.class.clone()),
            "content-desc" | "contentDescription" | "description" => {
                Some(self.content_desc.clone())
            }
            "package" | "packageName" => Some(self.package.clone()),
            "bounds" => Some(format!(
                "[{},{}][{},{}]",
                self.bounds.left, self.bounds.top, self.bounds.right, self.bounds.bottom
            )),
            "checkable" => flag(self.checkable),
            "checked" => flag(self.checked),
            "clickable" => flag(self.clickable),
            "enabled" => flag(self.enabled),
            "focusable" => flag(self.focusable),
            "focused" => flag(self.focused),
            "scrollable" => flag(self.scrollable),
            "long-clickable" | "longClickable" => flag(self.long_clickable),
            "selected" => flag(self.selected),
            "visible-to-user" | "visibleToUser" => flag(self.visible_to_user),
            _ => None,
        }
    }

    /// True when `ancestor` is a strict ancestor; `None` stands for the document root
    pub fn descends_from(&self, nodes: &[UiNode], ancestor: Option<usize>) -> bool {
        let Some(ancestor) = ancestor else {
            return true;
        };
        let mut current = self.parent;
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = nodes.get(p).and_then(|n| n.parent);
        }
        false
    }

    fn from_tag(tag: &BytesStart<'_>, index: usize, parent: Option<usize>) -> Self {
        let mut node = UiNode {
            index,
            parent,
            enabled: true,
            visible_to_user: true,
            ..Default::default()
        };

        for attr in tag.attributes().filter_map(|a| a.ok()) {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
            let truthy = value == "true";

            match key.as_str() {
                "class" => node.class = value,
                "text" => node.text = value,
                "resource-id" => node.resource_id = value,
                "content-desc" => node.content_desc = value,
                "package" => node.package = value,
                "bounds" => {
                    if let Some(b) = Bounds::parse(&value) {
                        node.bounds = b;
                    }
                }
                "checkable" => node.checkable = truthy,
                "checked" => node.checked = truthy,
                "clickable" => node.clickable = truthy,
                "enabled" => node.enabled = truthy,
                "focusable" => node.focusable = truthy,
                "focused" => node.focused = truthy,
                "scrollable" => node.scrollable = truthy,
                "long-clickable" => node.long_clickable = truthy,
                "selected" => node.selected = truthy,
                "visible-to-user" => node.visible_to_user = truthy,
                _ => {}
            }
        }
        node
    }
}

/// Parse UI hierarchy XML from uiautomator dump, keeping parent links
pub fn parse_hierarchy(xml: &str) -> Result<Vec<UiNode>> {
    let start = xml.find('<').unwrap_or(0);
    let end = xml
        .rfind("</hierarchy>")
        .map(|i| i + "</hierarchy>".len())
        .unwrap_or(xml.len());
    let mut reader = Reader::from_str(&xml[start..end]);
    reader.trim_text(true);

    let mut nodes: Vec<UiNode> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .context("Malformed UI hierarchy XML")?
        {
            Event::Start(ref e) if e.name().as_ref() == b"node" => {
                let index = nodes.len();
                nodes.push(UiNode::from_tag(e, index, stack.last().copied()));
                stack.push(index);
            }
            Event::Empty(ref e) if e.name().as_ref() == b"node" => {
                let index = nodes.len();
                nodes.push(UiNode::from_tag(e, index, stack.last().copied()));
            }
            Event::End(ref e) if e.name().as_ref() == b"node" => {
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(nodes)
}

#[cfg(test)]
pub(crate) const SAMPLE_DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" package="com.example.app" content-desc="" clickable="false" enabled="true" bounds="[0,0][1080,2400]">
    <node index="0" text="" resource-id="com.example.app:id/list" class="androidx.recyclerview.widget.RecyclerView" package="com.example.app" content-desc="" scrollable="true" enabled="true" bounds="[0,200][1080,2200]">
      <node index="0" text="Tom &amp; Jerry" resource-id="com.example.app:id/title" class="android.widget.TextView" package="com.example.app" content-desc="" enabled="true" bounds="[0,200][1080,400]" />
      <node index="1" text="Login now" resource-id="com.example.app:id/title" class="android.widget.TextView" package="com.example.app" content-desc="" enabled="true" bounds="[0,400][1080,600]" />
    </node>
    <node index="1" text="" resource-id="com.example.app:id/login" class="android.widget.Button" package="com.example.app" content-desc="Sign in" clickable="true" enabled="false" checked="true" visible-to-user="false" bounds="[40,2220][1040,2380]" />
  </node>
</hierarchy>
UI hierchary dumped to: /dev/stdout"#;
