//! Evaluation of native key/value queries and a practical XPath subset
//! against a parsed hierarchy.

use super::hierarchy::UiNode;
use crate::driver::selector::BackendLocator;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Indices of nodes matching `locator`, in document order.
///
/// With `scope`, only descendants of that node are considered.
pub fn select(nodes: &[UiNode], locator: &BackendLocator, scope: Option<usize>) -> Result<Vec<usize>> {
    match locator {
        BackendLocator::Query { using, .. } => {
            anyhow::bail!("uiautomator2 backend cannot run '{}' queries", using)
        }
        BackendLocator::Native(query) => {
            if let Some(expr) = query.get("xpath") {
                if query.len() > 1 {
                    anyhow::bail!("An xpath query cannot be combined with other keys");
                }
                return Ok(XPath::parse(expr)?.select(nodes, scope));
            }
            let predicates = compile(query)?;
            Ok(nodes
                .iter()
                .filter(|n| n.descends_from(nodes, scope))
                .filter(|n| predicates.iter().all(|p| p.matches(n)))
                .map(|n| n.index)
                .collect())
        }
    }
}

enum Match {
    Equals(String),
    Contains(String),
    StartsWith(String),
    Regex(Regex),
    Flag(bool),
}

struct Predicate {
    attribute: &'static str,
    matcher: Match,
}

impl Predicate {
    fn matches(&self, node: &UiNode) -> bool {
        let actual = node.attribute(self.attribute).unwrap_or_default();
        match &self.matcher {
            Match::Equals(v) => actual == *v,
            Match::Contains(v) => actual.contains(v.as_str()),
            Match::StartsWith(v) => actual.starts_with(v.as_str()),
            Match::Regex(re) => re.is_match(&actual),
            Match::Flag(v) => (actual == "true") == *v,
        }
    }
}

fn compile(query: &BTreeMap<String, String>) -> Result<Vec<Predicate>> {
    query
        .iter()
        .map(|(key, value)| {
            let pred = |attribute: &'static str, matcher: Match| Predicate { attribute, matcher };
            let regex = || {
                Regex::new(value).with_context(|| format!("Invalid pattern for {}: {}", key, value))
            };
            Ok(match key.as_str() {
                "text" => pred("text", Match::Equals(value.clone())),
                "textContains" => pred("text", Match::Contains(value.clone())),
                "textStartsWith" => pred("text", Match::StartsWith(value.clone())),
                "textMatches" => pred("text", Match::Regex(regex()?)),
                "resourceId" => pred("resource-id", Match::Equals(value.clone())),
                "resourceIdMatches" => pred("resource-id", Match::Regex(regex()?)),
                "className" => pred("class", Match::Equals(value.clone())),
                "classNameMatches" => pred("class", Match::Regex(regex()?)),
                "description" => pred("content-desc", Match::Equals(value.clone())),
                "descriptionContains" => pred("content-desc", Match::Contains(value.clone())),
                "descriptionStartsWith" => pred("content-desc", Match::StartsWith(value.clone())),
                "descriptionMatches" => pred("content-desc", Match::Regex(regex()?)),
                "packageName" => pred("package", Match::Equals(value.clone())),
                "checkable" | "checked" | "clickable" | "enabled" | "focusable" | "focused"
                | "scrollable" | "longClickable" | "selected" => {
                    let attribute = match key.as_str() {
                        "checkable" => "checkable",
                        "checked" => "checked",
                        "clickable" => "clickable",
                        "enabled" => "enabled",
                        "focusable" => "focusable",
                        "focused" => "focused",
                        "scrollable" => "scrollable",
                        "longClickable" => "long-clickable",
                        _ => "selected",
                    };
                    pred(attribute, Match::Flag(value.trim().eq_ignore_ascii_case("true")))
                }
                other => anyhow::bail!("Unsupported uiautomator2 query key: {}", other),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug)]
struct Step {
    axis: Axis,
    name: String,
    predicates: Vec<StepPredicate>,
}

#[derive(Debug)]
enum StepPredicate {
    Position(usize),
    Expr(Expr),
}

#[derive(Debug)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Has(String),
    Eq(String, String),
    Ne(String, String),
    Contains(String, String),
    StartsWith(String, String),
    EndsWith(String, String),
}

impl Expr {
    fn eval(&self, node: &UiNode) -> bool {
        let attr = |name: &str| node.attribute(name);
        match self {
            Expr::Or(a, b) => a.eval(node) || b.eval(node),
            Expr::And(a, b) => a.eval(node) && b.eval(node),
            Expr::Not(e) => !e.eval(node),
            Expr::Has(name) => attr(name).map(|v| !v.is_empty()).unwrap_or(false),
            Expr::Eq(name, v) => attr(name).as_deref() == Some(v.as_str()),
            Expr::Ne(name, v) => attr(name).map(|a| a != *v).unwrap_or(false),
            Expr::Contains(name, v) => attr(name).map(|a| a.contains(v.as_str())).unwrap_or(false),
            Expr::StartsWith(name, v) => {
                attr(name).map(|a| a.starts_with(v.as_str())).unwrap_or(false)
            }
            Expr::EndsWith(name, v) => attr(name).map(|a| a.ends_with(v.as_str())).unwrap_or(false),
        }
    }
}

/// Location paths over `<node>` elements whose tag is the node class.
///
/// Supported: `/` and `//` steps, `*` or class-name tests (full or simple
/// name), positional predicates, `@attr`, `=`, `!=`, `and`, `or`, `not()`,
/// `contains()`, `starts-with()`, `ends-with()`, `text()` and `concat()`.
#[derive(Debug)]
pub struct XPath {
    steps: Vec<Step>,
}

impl XPath {
    pub fn parse(expr: &str) -> Result<Self> {
        let mut parser = Parser {
            chars: expr.chars().collect(),
            pos: 0,
        };
        let steps = parser
            .path()
            .with_context(|| format!("Unsupported XPath expression: {}", expr))?;
        Ok(Self { steps })
    }

    pub fn select(&self, nodes: &[UiNode], scope: Option<usize>) -> Vec<usize> {
        let mut context: Vec<Option<usize>> = vec![scope];

        for step in &self.steps {
            let mut next = BTreeSet::new();
            for ctx in &context {
                let mut current: Vec<usize> = nodes
                    .iter()
                    .filter(|n| match step.axis {
                        Axis::Child => n.parent == *ctx,
                        Axis::Descendant => n.descends_from(nodes, *ctx),
                    })
                    .filter(|n| name_matches(&step.name, &n.class))
                    .map(|n| n.index)
                    .collect();

                for predicate in &step.predicates {
                    current = match predicate {
                        StepPredicate::Position(p) => {
                            current.get(p.saturating_sub(1)).copied().into_iter().collect()
                        }
                        StepPredicate::Expr(e) => {
                            current.into_iter().filter(|i| e.eval(&nodes[*i])).collect()
                        }
                    };
                }
                next.extend(current);
            }
            context = next.into_iter().map(Some).collect();
        }

        context.into_iter().flatten().collect()
    }
}

fn name_matches(name: &str, class: &str) -> bool {
    name == "*"
        || name == "node"
        || name == class
        || class.rsplit('.').next() == Some(name)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn ws(&mut self) {
        while self.peek().map(char::is_whitespace).unwrap_or(false) {
            self.pos += 1;
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        self.ws();
        if !self.eat(s) {
            anyhow::bail!("expected '{}' at position {}", s, self.pos);
        }
        Ok(())
    }

    /// Keyword followed by a non-identifier character
    fn eat_keyword(&mut self, word: &str) -> bool {
        let end = self.pos + word.chars().count();
        let boundary = self.chars.get(end).map(|c| !is_ident(*c)).unwrap_or(true);
        if self.starts_with(word) && boundary {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while self.peek().map(is_ident).unwrap_or(false) {
            self.pos += 1;
        }
        if start == self.pos {
            anyhow::bail!("expected a name at position {}", self.pos);
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn path(&mut self) -> Result<Vec<Step>> {
        self.ws();
        self.eat(".");
        let mut steps = Vec::new();
        loop {
            self.ws();
            let axis = if self.eat("//") {
                Axis::Descendant
            } else if self.eat("/") {
                Axis::Child
            } else if steps.is_empty() && self.peek().is_some() {
                Axis::Child
            } else {
                break;
            };

            self.ws();
            let name = if self.eat("*") {
                "*".to_string()
            } else {
                self.ident()?
            };

            let mut predicates = Vec::new();
            loop {
                self.ws();
                if !self.eat("[") {
                    break;
                }
                self.ws();
                let predicate = if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    let digits = self.ident()?;
                    StepPredicate::Position(digits.parse().context("invalid position")?)
                } else {
                    StepPredicate::Expr(self.or_expr()?)
                };
                self.expect("]")?;
                predicates.push(predicate);
            }
            steps.push(Step {
                axis,
                name,
                predicates,
            });
        }

        if steps.is_empty() || self.pos < self.chars.len() {
            anyhow::bail!("unexpected input at position {}", self.pos);
        }
        Ok(steps)
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        loop {
            self.ws();
            if !self.eat_keyword("or") {
                return Ok(left);
            }
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            self.ws();
            if !self.eat_keyword("and") {
                return Ok(left);
            }
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        self.ws();
        if self.starts_with("not") && self.eat_keyword("not") {
            self.expect("(")?;
            let inner = self.or_expr()?;
            self.expect(")")?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        self.ws();
        if self.eat("(") {
            let inner = self.or_expr()?;
            self.expect(")")?;
            return Ok(inner);
        }

        if self.peek() == Some('@') || self.starts_with("text()") {
            let attr = self.attribute()?;
            self.ws();
            return Ok(if self.eat("!=") {
                Expr::Ne(attr, self.literal()?)
            } else if self.eat("=") {
                Expr::Eq(attr, self.literal()?)
            } else {
                Expr::Has(attr)
            });
        }

        let function = self.ident()?;
        self.expect("(")?;
        let attr = self.attribute()?;
        self.expect(",")?;
        let value = self.literal()?;
        self.expect(")")?;
        Ok(match function.as_str() {
            "contains" => Expr::Contains(attr, value),
            "starts-with" => Expr::StartsWith(attr, value),
            "ends-with" => Expr::EndsWith(attr, value),
            other => anyhow::bail!("unsupported function {}()", other),
        })
    }

    fn attribute(&mut self) -> Result<String> {
        self.ws();
        if self.eat("text()") {
            return Ok("text".to_string());
        }
        if !self.eat("@") {
            anyhow::bail!("expected an attribute at position {}", self.pos);
        }
        self.ident()
    }

    fn literal(&mut self) -> Result<String> {
        self.ws();
        if self.eat_keyword("concat") {
            self.expect("(")?;
            let mut value = self.literal()?;
            loop {
                self.ws();
                if !self.eat(",") {
                    break;
                }
                value.push_str(&self.literal()?);
            }
            self.expect(")")?;
            return Ok(value);
        }

        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => anyhow::bail!("expected a string literal at position {}", self.pos),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let value = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                return Ok(value);
            }
            self.pos += 1;
        }
        anyhow::bail!("unterminated string literal")
    }
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '$' | ':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::selector::SelectorTransformer;
    use crate::driver::traits::Backend;
    use crate::driver::uiautomator2::hierarchy::{parse_hierarchy, SAMPLE_DUMP};

    fn nodes() -> Vec<UiNode> {
        parse_hierarchy(SAMPLE_DUMP).unwrap()
    }

    #[test]
    fn test_native_queries() {
        let nodes = nodes();
        let t = SelectorTransformer::new();
        let find = |ty: &str, v: &str| {
            select(&nodes, &t.transform(ty, v, Backend::Uiautomator2).unwrap(), None).unwrap()
        };

        assert_eq!(find("id", "com.example.app:id/title"), vec![2, 3]);
        assert_eq!(find("text", "Login now"), vec![3]);
        assert_eq!(find("text_contains", "Jerry"), vec![2]);
        assert_eq!(find("text_starts_with", "Log"), vec![3]);
        assert_eq!(find("accessibility_id", "Sign in"), vec![4]);
        assert_eq!(find("clickable", "TRUE"), vec![4]);
        assert_eq!(find("class", "android.widget.Button"), vec![4]);
    }

    #[test]
    fn test_combined_native_query_is_conjunctive() {
        let nodes = nodes();
        let mut query = BTreeMap::new();
        query.insert("resourceId".to_string(), "com.example.app:id/title".to_string());
        query.insert("textContains".to_string(), "Login".to_string());
        assert_eq!(select(&nodes, &BackendLocator::Native(query), None).unwrap(), vec![3]);
    }

    #[test]
    fn test_scoped_query_only_sees_descendants() {
        let nodes = nodes();
        let loc = BackendLocator::native("className", "android.widget.TextView");
        assert_eq!(select(&nodes, &loc, Some(1)).unwrap(), vec![2, 3]);
        assert!(select(&nodes, &loc, Some(4)).unwrap().is_empty());
    }

    #[test]
    fn test_xpath_subset() {
        let nodes = nodes();
        let run = |expr: &str| XPath::parse(expr).unwrap().select(&nodes, None);

        assert_eq!(run("//android.widget.TextView"), vec![2, 3]);
        assert_eq!(run("//TextView[2]"), vec![3]);
        assert_eq!(run("//*[@resource-id='com.example.app:id/login']"), vec![4]);
        assert_eq!(
            run("//*[contains(@text, 'Login') or contains(@label, 'Login') or contains(@name, 'Login')]"),
            vec![3]
        );
        assert_eq!(run("//*[starts-with(@text, \"Tom\")]"), vec![2]);
        assert_eq!(run("/node/RecyclerView/*"), vec![2, 3]);
        assert_eq!(run("//*[@clickable='true' and not(@enabled='true')]"), vec![4]);
        assert_eq!(run("//*[text()=concat('Tom ', '&', ' Jerry')]"), vec![2]);
    }

    #[test]
    fn test_transformed_appium_text_xpath_runs_locally() {
        let nodes = nodes();
        let t = SelectorTransformer::new();
        let loc = t.transform("text", "Login now", Backend::Appium).unwrap();
        let expr = loc.xpath().unwrap();
        assert_eq!(XPath::parse(expr).unwrap().select(&nodes, None), vec![3]);
    }

    #[test]
    fn test_rejects_bad_queries() {
        let nodes = nodes();
        assert!(XPath::parse("//*[@text=").is_err());
        assert!(XPath::parse("//*[position() > 2]").is_err());
        assert!(select(&nodes, &BackendLocator::native("bogusKey", "x"), None).is_err());
        assert!(select(&nodes, &BackendLocator::query("id", "x"), None).is_err());
    }
}
