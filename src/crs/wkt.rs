//! Minimal WKT1 reader for `.prj` sidecar files.
//!
//! Produces a node tree; interpretation into a [`super::Crs`] happens in the
//! parent module.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WktValue {
    Node(WktNode),
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WktNode {
    pub keyword: String,
    pub args: Vec<WktValue>,
}

impl WktNode {
    /// First quoted string argument (the object name for most keywords).
    pub fn name(&self) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg {
            WktValue::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn numbers(&self) -> Vec<f64> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                WktValue::Number(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn children<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a WktNode> + 'a {
        self.args.iter().filter_map(move |arg| match arg {
            WktValue::Node(node) if node.keyword.eq_ignore_ascii_case(keyword) => Some(node),
            _ => None,
        })
    }

    pub fn child(&self, keyword: &str) -> Option<&WktNode> {
        self.args.iter().find_map(|arg| match arg {
            WktValue::Node(node) if node.keyword.eq_ignore_ascii_case(keyword) => Some(node),
            _ => None,
        })
    }
}

pub(crate) fn parse(input: &str) -> Result<WktNode, String> {
    let mut parser = Parser {
        chars: input.trim().trim_start_matches('\u{feff}').chars().collect(),
        pos: 0,
    };
    let node = parser.node()?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(format!("trailing content at offset {}", parser.pos));
    }
    Ok(node)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn node(&mut self) -> Result<WktNode, String> {
        self.skip_whitespace();
        let keyword = self.word();
        if keyword.is_empty() {
            return Err(format!("expected keyword at offset {}", self.pos));
        }
        self.skip_whitespace();
        let close = match self.peek() {
            Some('[') => ']',
            Some('(') => ')',
            other => return Err(format!("expected '[' after {keyword}, found {other:?}")),
        };
        self.pos += 1;

        let mut args = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                Some(',') if !args.is_empty() => {
                    self.pos += 1;
                    continue;
                }
                Some(_) => args.push(self.value()?),
                None => return Err(format!("unterminated {keyword}")),
            }
        }

        Ok(WktNode { keyword, args })
    }

    fn value(&mut self) -> Result<WktValue, String> {
        match self.peek() {
            Some('"') => self.quoted().map(WktValue::Text),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let checkpoint = self.pos;
                let word = self.word();
                self.skip_whitespace();
                if matches!(self.peek(), Some('[') | Some('(')) {
                    self.pos = checkpoint;
                    self.node().map(WktValue::Node)
                } else {
                    // Bare enumerations such as AXIS["X",EAST]
                    Ok(WktValue::Text(word))
                }
            }
            other => Err(format!("unexpected {other:?} at offset {}", self.pos)),
        }
    }

    fn quoted(&mut self) -> Result<String, String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                Some('"') if self.chars.get(self.pos + 1) == Some(&'"') => {
                    out.push('"');
                    self.pos += 2;
                }
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    fn number(&mut self) -> Result<WktValue, String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(WktValue::Number)
            .map_err(|e| format!("invalid number '{text}': {e}"))
    }
}
