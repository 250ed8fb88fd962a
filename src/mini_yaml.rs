//! Strict YAML subset tokenizer producing a position-tracking node tree.
//!
//! Supports block mappings and sequences (including compact nested items),
//! single-line flow collections, plain and quoted scalars, literal/folded
//! block scalars, anchors, aliases and tags. Everything outside that subset
//! is reported as malformed instead of being guessed at.

use std::collections::{HashMap, HashSet};

use crate::ast::{Document, Node, NodeId, NodeKind, Position, Style};
use crate::error::{ErrorKind, RigidError};

/// Lines accepted in one document.
const LINE_LIMIT: usize = 100_000;
/// Collections nested in one another, block and flow combined.
const NESTING_LIMIT: usize = 64;
/// Entries of a single mapping or sequence.
const ENTRY_LIMIT: usize = 50_000;
/// Bytes of a value written on one line, flow collections included.
const LINE_VALUE_LIMIT: usize = 64 * 1024;

/// Parses a single YAML document.
pub fn parse_document(input: &str) -> Result<Document, RigidError> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let lines = split_lines(input)?;
    if lines.len() > LINE_LIMIT {
        return Err(RigidError::malformed(
            Position::new(LINE_LIMIT + 1, 1),
            format!("document has more than {LINE_LIMIT} lines"),
        ));
    }

    let (start, end) = document_bounds(&lines)?;
    let mut parser = Parser {
        lines,
        idx: start,
        end,
        nodes: Vec::new(),
        anchors: HashMap::new(),
    };
    parser.skip_ignorable();
    if parser.idx >= parser.end {
        return Err(RigidError::new(
            ErrorKind::YamlEmptyFile,
            ErrorKind::YamlEmptyFile.to_string(),
        ));
    }

    let indent = leading_spaces(&parser.lines[parser.idx].text);
    let root = parser.parse_block(indent, Props::default(), 0)?;
    parser.skip_ignorable();
    if parser.idx < parser.end {
        let line = &parser.lines[parser.idx];
        let column = leading_spaces(&line.text) + 1;
        return Err(RigidError::malformed(
            Position::new(line.number, column),
            "unexpected content after the root node",
        ));
    }

    Ok(Document {
        nodes: parser.nodes,
        root,
    })
}

struct Line {
    number: usize,
    text: String,
}

/// Final line breaks of a block scalar: `-` strips, `+` keeps, none clips.
#[derive(Clone, Copy)]
enum Chomping {
    Strip,
    Clip,
    Keep,
}

impl Chomping {
    /// Appends the final breaks to a non-empty body whose `blank_tail`
    /// trailing blank lines were cut off.
    fn finish(self, body: &mut String, blank_tail: usize) {
        let breaks = match self {
            Chomping::Strip => 0,
            Chomping::Clip => 1,
            Chomping::Keep => blank_tail + 1,
        };
        body.extend(std::iter::repeat('\n').take(breaks));
    }
}

/// Indicators after `|` or `>`.
#[derive(Clone, Copy)]
struct BlockHeader {
    folded: bool,
    chomping: Chomping,
    indent: Option<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Context {
    Root,
    MappingValue,
    SequenceItem,
}

#[derive(Default)]
struct Props {
    anchor: Option<String>,
    tag: Option<String>,
    position: Option<Position>,
}

impl Props {
    fn is_empty(&self) -> bool {
        self.anchor.is_none() && self.tag.is_none()
    }
}

struct Parser {
    lines: Vec<Line>,
    idx: usize,
    end: usize,
    nodes: Vec<Node>,
    anchors: HashMap<String, NodeId>,
}

impl Parser {
    fn skip_ignorable(&mut self) {
        while self.idx < self.end && is_ignorable(&self.lines[self.idx].text) {
            self.idx += 1;
        }
    }

    fn next_content_line(&self) -> Option<usize> {
        (self.idx..self.end).find(|i| !is_ignorable(&self.lines[*i].text))
    }

    fn finish(&mut self, mut node: Node, props: Props) -> NodeId {
        if let Some(position) = props.position {
            node.position = position;
        }
        node.tag = props.tag;
        node.anchor = props.anchor.clone();
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        if let Some(anchor) = props.anchor {
            self.anchors.insert(anchor, id);
        }
        id
    }

    fn alias(&mut self, name: &str, position: Position) -> Result<NodeId, RigidError> {
        let target = *self.anchors.get(name).ok_or_else(|| {
            RigidError::malformed(position, format!("unknown anchor \"{name}\" referenced"))
        })?;
        let mut node = Node::scalar(name, Style::Plain, position);
        node.kind = NodeKind::Alias;
        node.alias = Some(target);
        Ok(self.finish(node, Props::default()))
    }

    fn parse_block(&mut self, indent: usize, props: Props, depth: usize) -> Result<NodeId, RigidError> {
        self.skip_ignorable();
        let line_idx = self.idx;
        let line = &self.lines[line_idx];
        if depth > NESTING_LIMIT {
            return Err(RigidError::malformed(
                Position::new(line.number, indent + 1),
                format!("collections nested deeper than {NESTING_LIMIT} levels"),
            ));
        }
        let trimmed = &line.text[indent..];
        if is_sequence_entry(trimmed) {
            self.parse_sequence(indent, props, depth)
        } else if find_mapping_colon(trimmed).is_some() {
            self.parse_mapping(indent, props, depth)
        } else {
            let number = line.number;
            self.parse_value(
                line_idx,
                indent,
                indent,
                Position::new(number, indent + 1),
                Context::Root,
                props,
                depth,
            )
        }
    }

    fn parse_mapping(&mut self, indent: usize, props: Props, depth: usize) -> Result<NodeId, RigidError> {
        let first = self.lines[self.idx].number;
        let mut mapping = Node::collection(NodeKind::Mapping, Style::Block, Position::new(first, indent + 1));
        let mut seen = HashSet::new();

        loop {
            self.skip_ignorable();
            if self.idx >= self.end {
                break;
            }
            let line_idx = self.idx;
            let text = self.lines[line_idx].text.clone();
            let number = self.lines[line_idx].number;
            let current_indent = leading_spaces(&text);
            if current_indent < indent {
                break;
            }
            if current_indent > indent {
                return Err(RigidError::malformed(
                    Position::new(number, current_indent + 1),
                    format!("unexpected indentation in mapping: expected {indent}, found {current_indent}"),
                ));
            }

            let trimmed = &text[indent..];
            if is_sequence_entry(trimmed) {
                return Err(RigidError::malformed(
                    Position::new(number, indent + 1),
                    "block sequence entries are not allowed in this context",
                ));
            }
            if trimmed == "?" || trimmed.starts_with("? ") {
                return Err(RigidError::malformed(
                    Position::new(number, indent + 1),
                    "complex mapping keys are not supported",
                ));
            }
            let colon = find_mapping_colon(trimmed).ok_or_else(|| {
                RigidError::malformed(Position::new(number, indent + 1), "could not find expected ':'")
            })?;

            let key = self.parse_key(trimmed[..colon].trim_end(), Position::new(number, indent + 1))?;
            let key_text = {
                let node = &self.nodes[key.0];
                match node.alias {
                    Some(target) => self.nodes[target.0].value.clone(),
                    None => node.value.clone(),
                }
            };
            if !seen.insert(key_text.clone()) {
                return Err(RigidError::malformed(
                    Position::new(number, indent + 1),
                    format!("mapping key \"{key_text}\" already defined"),
                ));
            }

            let after_colon = indent + colon + 1;
            let value_start = after_colon + whitespace_len(&text[after_colon..]);
            let empty_pos = Position::new(number, column_of(&text, after_colon));
            let value = self.parse_value(
                line_idx,
                value_start,
                indent,
                empty_pos,
                Context::MappingValue,
                Props::default(),
                depth + 1,
            )?;

            mapping.children.push(key);
            mapping.children.push(value);
            if mapping.children.len() / 2 > ENTRY_LIMIT {
                return Err(RigidError::malformed(
                    Position::new(number, indent + 1),
                    format!("mapping has more than {ENTRY_LIMIT} entries"),
                ));
            }
        }

        Ok(self.finish(mapping, props))
    }

    fn parse_sequence(&mut self, indent: usize, props: Props, depth: usize) -> Result<NodeId, RigidError> {
        let first = self.lines[self.idx].number;
        let mut sequence =
            Node::collection(NodeKind::Sequence, Style::Block, Position::new(first, indent + 1));

        loop {
            self.skip_ignorable();
            if self.idx >= self.end {
                break;
            }
            let line_idx = self.idx;
            let text = self.lines[line_idx].text.clone();
            let number = self.lines[line_idx].number;
            let current_indent = leading_spaces(&text);
            if current_indent < indent {
                break;
            }
            if current_indent > indent {
                return Err(RigidError::malformed(
                    Position::new(number, current_indent + 1),
                    format!("unexpected indentation in sequence: expected {indent}, found {current_indent}"),
                ));
            }
            let trimmed = &text[indent..];
            if !is_sequence_entry(trimmed) {
                break;
            }

            let gap = &trimmed[1..];
            let rest_start = indent + 1 + whitespace_len(gap);
            let rest = strip_comment(&text[rest_start..]);
            let empty_pos = Position::new(number, indent + 2);

            let item = if !rest.is_empty() && is_compact_block(rest) {
                if text[indent + 1..rest_start].contains('\t') {
                    return Err(RigidError::malformed(
                        Position::new(number, indent + 2),
                        "found a tab character where an indentation space is expected",
                    ));
                }
                let mut blanked = text.clone();
                blanked.replace_range(indent..indent + 1, " ");
                self.lines[line_idx].text = blanked;
                self.parse_block(rest_start, Props::default(), depth + 1)?
            } else {
                self.parse_value(
                    line_idx,
                    rest_start,
                    indent,
                    empty_pos,
                    Context::SequenceItem,
                    Props::default(),
                    depth + 1,
                )?
            };

            sequence.children.push(item);
            if sequence.children.len() > ENTRY_LIMIT {
                return Err(RigidError::malformed(
                    Position::new(number, indent + 1),
                    format!("sequence has more than {ENTRY_LIMIT} entries"),
                ));
            }
        }

        Ok(self.finish(sequence, props))
    }

    /// Parses the value that starts at byte `start` of line `line_idx`,
    /// continuing onto following lines for nested blocks and block scalars.
    #[allow(clippy::too_many_arguments)]
    fn parse_value(
        &mut self,
        line_idx: usize,
        start: usize,
        owner_indent: usize,
        empty_pos: Position,
        context: Context,
        inherited: Props,
        depth: usize,
    ) -> Result<NodeId, RigidError> {
        let text = self.lines[line_idx].text.clone();
        let number = self.lines[line_idx].number;
        if depth > NESTING_LIMIT {
            return Err(RigidError::malformed(
                Position::new(number, column_of(&text, start)),
                format!("collections nested deeper than {NESTING_LIMIT} levels"),
            ));
        }
        if text.len() - start > LINE_VALUE_LIMIT {
            return Err(RigidError::malformed(
                Position::new(number, column_of(&text, start)),
                format!("value longer than {LINE_VALUE_LIMIT} bytes"),
            ));
        }

        let (props, rest_start) = parse_props(&text, start, number, inherited, false)?;
        let rest = strip_comment(&text[rest_start..]);
        let rest_pos = Position::new(number, column_of(&text, rest_start));

        if rest.is_empty() {
            self.idx = line_idx + 1;
            let next = self.next_content_line().map(|i| {
                let line_text = &self.lines[i].text;
                let next_indent = leading_spaces(line_text);
                (next_indent, is_sequence_entry(&line_text[next_indent..]))
            });
            return match next {
                Some((next_indent, _)) if next_indent > owner_indent => {
                    self.parse_block(next_indent, props, depth)
                }
                Some((next_indent, true))
                    if context == Context::MappingValue && next_indent == owner_indent =>
                {
                    self.parse_sequence(owner_indent, props, depth)
                }
                _ => Ok(self.finish(Node::scalar("", Style::Plain, empty_pos), props)),
            };
        }

        if let Some(header) = block_header(rest, rest_pos)? {
            self.idx = line_idx + 1;
            let value = self.parse_block_scalar(owner_indent, context, header);
            let style = if header.folded { Style::Folded } else { Style::Literal };
            return Ok(self.finish(Node::scalar(value, style, rest_pos), props));
        }

        self.idx = line_idx + 1;
        match rest.as_bytes()[0] {
            b'*' => {
                if !props.is_empty() {
                    return Err(RigidError::malformed(rest_pos, "an alias must not carry an anchor or tag"));
                }
                let name = &rest[1..];
                if name.is_empty() || name.contains(char::is_whitespace) {
                    return Err(RigidError::malformed(rest_pos, format!("invalid alias \"{rest}\"")));
                }
                self.alias(name, rest_pos)
            }
            b'[' | b'{' => {
                let mut flow = Flow {
                    parser: self,
                    text: &text,
                    pos: rest_start,
                    line: number,
                };
                let id = flow.node(props, depth)?;
                flow.skip_ws();
                let end = flow.pos;
                if !strip_comment(&text[end..]).is_empty() {
                    return Err(RigidError::malformed(
                        Position::new(number, column_of(&text, end)),
                        "unexpected content after flow collection",
                    ));
                }
                Ok(id)
            }
            b'"' | b'\'' => {
                let (value, end) = scan_quoted(&text, rest_start, number)?;
                if !strip_comment(&text[end..]).is_empty() {
                    return Err(RigidError::malformed(
                        Position::new(number, column_of(&text, end)),
                        "unexpected content after quoted scalar",
                    ));
                }
                let style = if rest.starts_with('"') {
                    Style::DoubleQuoted
                } else {
                    Style::SingleQuoted
                };
                Ok(self.finish(Node::scalar(value, style, rest_pos), props))
            }
            _ => {
                check_plain(rest, rest_pos)?;
                Ok(self.finish(Node::scalar(rest, Style::Plain, rest_pos), props))
            }
        }
    }

    fn parse_key(&mut self, raw: &str, position: Position) -> Result<NodeId, RigidError> {
        match raw.as_bytes().first() {
            None => Err(RigidError::malformed(position, "empty mapping key")),
            Some(b'"' | b'\'') => {
                let (value, end) = scan_quoted(raw, 0, position.line)?;
                if !raw[end..].trim().is_empty() {
                    return Err(RigidError::malformed(position, format!("invalid mapping key {raw}")));
                }
                let style = if raw.starts_with('"') {
                    Style::DoubleQuoted
                } else {
                    Style::SingleQuoted
                };
                Ok(self.finish(Node::scalar(value, style, position), Props::default()))
            }
            Some(b'*') => self.alias(&raw[1..], position),
            Some(b'&' | b'!' | b'[' | b'{' | b'?' | b'|' | b'>' | b'@' | b'`' | b'%') => Err(
                RigidError::malformed(position, format!("unsupported mapping key \"{raw}\"")),
            ),
            Some(_) => Ok(self.finish(Node::scalar(raw, Style::Plain, position), Props::default())),
        }
    }

    fn parse_block_scalar(
        &mut self,
        owner_indent: usize,
        context: Context,
        header: BlockHeader,
    ) -> String {
        let parent_indent = if context == Context::Root {
            None
        } else {
            Some(owner_indent)
        };
        let mut content = Vec::<String>::new();
        let mut content_indent = header
            .indent
            .map(|v| parent_indent.map_or(v, |p| p + v));

        while self.idx < self.end {
            let line = &self.lines[self.idx];
            let indent = leading_spaces(&line.text);
            if line.text[indent..].trim().is_empty() {
                content.push(String::new());
                self.idx += 1;
                continue;
            }

            let effective_indent = match content_indent {
                Some(v) => v,
                None => {
                    if parent_indent.is_some_and(|p| indent <= p) {
                        break;
                    }
                    content_indent = Some(indent);
                    indent
                }
            };
            if indent < effective_indent {
                break;
            }

            content.push(line.text[effective_indent..].to_string());
            self.idx += 1;
        }

        let mut blank_tail = 0;
        while content.last().is_some_and(String::is_empty) {
            content.pop();
            blank_tail += 1;
        }
        if content.is_empty() {
            return String::new();
        }

        let mut body = if header.folded {
            fold_lines(&content)
        } else {
            content.join("\n")
        };
        header.chomping.finish(&mut body, blank_tail);
        body
    }
}

/// Cursor over one line holding a flow collection.
struct Flow<'p, 't> {
    parser: &'p mut Parser,
    text: &'t str,
    pos: usize,
    line: usize,
}

impl Flow<'_, '_> {
    fn position(&self) -> Position {
        Position::new(self.line, column_of(self.text, self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        self.pos += whitespace_len(&self.text[self.pos..]);
    }

    fn error(&self, detail: impl std::fmt::Display) -> RigidError {
        RigidError::malformed(self.position(), detail)
    }

    fn node(&mut self, inherited: Props, depth: usize) -> Result<NodeId, RigidError> {
        if depth > NESTING_LIMIT {
            return Err(self.error(format!("collections nested deeper than {NESTING_LIMIT} levels")));
        }
        self.skip_ws();
        let (props, next) = parse_props(self.text, self.pos, self.line, inherited, true)?;
        self.pos = next;
        let position = self.position();

        match self.peek() {
            Some(b'[') => self.sequence(props, position, depth),
            Some(b'{') => self.mapping(props, position, depth),
            Some(b'*') => {
                if !props.is_empty() {
                    return Err(self.error("an alias must not carry an anchor or tag"));
                }
                let name_start = self.pos + 1;
                let name_len = flow_token_len(&self.text[name_start..]);
                let name = self.text[name_start..name_start + name_len].to_string();
                self.pos = name_start + name_len;
                self.parser.alias(&name, position)
            }
            Some(quote @ (b'"' | b'\'')) => {
                let (value, end) = scan_quoted(self.text, self.pos, self.line)?;
                self.pos = end;
                let style = if quote == b'"' {
                    Style::DoubleQuoted
                } else {
                    Style::SingleQuoted
                };
                Ok(self.parser.finish(Node::scalar(value, style, position), props))
            }
            Some(b',' | b']' | b'}') | None => {
                Ok(self.parser.finish(Node::scalar("", Style::Plain, position), props))
            }
            Some(_) => {
                let start = self.pos;
                let bytes = self.text.as_bytes();
                while self.pos < bytes.len() {
                    match bytes[self.pos] {
                        b',' | b'[' | b']' | b'{' | b'}' => break,
                        b':' if matches!(bytes.get(self.pos + 1), None | Some(b' ' | b'\t' | b',' | b']' | b'}')) => {
                            break
                        }
                        b'#' if self.pos > start && matches!(bytes[self.pos - 1], b' ' | b'\t') => break,
                        _ => self.pos += 1,
                    }
                }
                let value = self.text[start..self.pos].trim_end();
                check_plain(value, position)?;
                Ok(self.parser.finish(Node::scalar(value, Style::Plain, position), props))
            }
        }
    }

    fn sequence(&mut self, props: Props, position: Position, depth: usize) -> Result<NodeId, RigidError> {
        let mut sequence = Node::collection(NodeKind::Sequence, Style::Flow, position);
        self.pos += 1;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                Some(b',') => return Err(self.error("empty flow sequence entry")),
                None => return Err(self.error("unterminated flow sequence: missing ']'")),
                Some(_) => {}
            }
            let item = self.node(Props::default(), depth + 1)?;
            sequence.children.push(item);
            if sequence.children.len() > ENTRY_LIMIT {
                return Err(self.error(format!("flow sequence has more than {ENTRY_LIMIT} entries")));
            }
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {}
                Some(b':') => return Err(self.error("mapping entries inside flow sequences are not supported")),
                _ => return Err(self.error("expected ',' or ']' in flow sequence")),
            }
        }
        Ok(self.parser.finish(sequence, props))
    }

    fn mapping(&mut self, props: Props, position: Position, depth: usize) -> Result<NodeId, RigidError> {
        let mut mapping = Node::collection(NodeKind::Mapping, Style::Flow, position);
        let mut seen = HashSet::new();
        self.pos += 1;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                Some(b',') => return Err(self.error("empty flow mapping entry")),
                Some(b'[' | b'{' | b'?') => return Err(self.error("complex mapping keys are not supported")),
                None => return Err(self.error("unterminated flow mapping: missing '}'")),
                Some(_) => {}
            }
            let key_position = self.position();
            let key = self.node(Props::default(), depth + 1)?;
            let key_text = {
                let node = &self.parser.nodes[key.0];
                if node.tag.is_some() || node.anchor.is_some() {
                    return Err(RigidError::malformed(key_position, "unsupported mapping key"));
                }
                match node.alias {
                    Some(target) => self.parser.nodes[target.0].value.clone(),
                    None => node.value.clone(),
                }
            };
            if !seen.insert(key_text.clone()) {
                return Err(RigidError::malformed(
                    key_position,
                    format!("mapping key \"{key_text}\" already defined"),
                ));
            }
            self.skip_ws();
            if self.peek() != Some(b':') {
                return Err(self.error("expected ':' in flow mapping"));
            }
            self.pos += 1;
            self.skip_ws();
            let value = match self.peek() {
                Some(b',' | b'}') => {
                    let empty = Node::scalar("", Style::Plain, self.position());
                    self.parser.finish(empty, Props::default())
                }
                _ => self.node(Props::default(), depth + 1)?,
            };
            mapping.children.push(key);
            mapping.children.push(value);
            if mapping.children.len() / 2 > ENTRY_LIMIT {
                return Err(self.error(format!("flow mapping has more than {ENTRY_LIMIT} entries")));
            }
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(self.error("expected ',' or '}' in flow mapping")),
            }
        }
        Ok(self.parser.finish(mapping, props))
    }
}

fn split_lines(input: &str) -> Result<Vec<Line>, RigidError> {
    let mut lines = Vec::new();
    for (i, raw) in input.split('\n').enumerate() {
        let number = i + 1;
        let text = raw.strip_suffix('\r').unwrap_or(raw);
        for (column, ch) in text.chars().enumerate() {
            if ch.is_control() && ch != '\t' {
                return Err(RigidError::malformed(
                    Position::new(number, column + 1),
                    format!("control characters are not allowed (found {:?})", ch),
                ));
            }
        }
        if !is_ignorable(text) {
            let indentation: String = text.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
            if let Some(tab) = indentation.find('\t') {
                return Err(RigidError::malformed(
                    Position::new(number, tab + 1),
                    "found a tab character where an indentation space is expected",
                ));
            }
        }
        lines.push(Line {
            number,
            text: text.to_string(),
        });
    }
    Ok(lines)
}

/// Index range of the single document's content lines.
fn document_bounds(lines: &[Line]) -> Result<(usize, usize), RigidError> {
    let mut start = 0usize;
    while start < lines.len() && is_ignorable(&lines[start].text) {
        start += 1;
    }
    if let Some(line) = lines.get(start) {
        if line.text.starts_with('%') {
            return Err(RigidError::malformed(
                Position::new(line.number, 1),
                "YAML directives are not supported",
            ));
        }
        if is_document_start(&line.text) {
            if !strip_comment(&line.text[3..]).is_empty() {
                return Err(RigidError::malformed(
                    Position::new(line.number, 5),
                    "content on the document start marker line is not supported",
                ));
            }
            start += 1;
        }
    }

    let mut end = start;
    while end < lines.len() {
        let text = &lines[end].text;
        if is_document_start(text) {
            return Err(multidoc(lines[end].number));
        }
        if is_document_end(text) {
            if let Some(after) = lines[end + 1..].iter().find(|l| !is_ignorable(&l.text)) {
                return Err(multidoc(after.number));
            }
            break;
        }
        end += 1;
    }
    Ok((start, end))
}

fn multidoc(line: usize) -> RigidError {
    RigidError::new(
        ErrorKind::YamlMultidoc,
        format!("at {}: {}", Position::new(line, 1), ErrorKind::YamlMultidoc),
    )
}

fn is_document_start(text: &str) -> bool {
    text == "---" || text.starts_with("--- ") || text.starts_with("---\t")
}

fn is_document_end(text: &str) -> bool {
    text == "..." || text.starts_with("... ") || text.starts_with("...\t")
}

/// Reads `&anchor` and `!tag` properties starting at byte `start`.
/// Returns the merged properties and the byte offset of the content.
fn parse_props(
    text: &str,
    start: usize,
    line: usize,
    inherited: Props,
    flow: bool,
) -> Result<(Props, usize), RigidError> {
    let mut props = inherited;
    let mut pos = start;
    loop {
        pos += whitespace_len(&text[pos..]);
        let Some(first @ (b'&' | b'!')) = text.as_bytes().get(pos).copied() else {
            break;
        };
        let position = Position::new(line, column_of(text, pos));
        let rest = &text[pos + 1..];
        let len = if flow {
            flow_token_len(rest)
        } else {
            rest.find(char::is_whitespace).unwrap_or(rest.len())
        };
        let name = &rest[..len];
        if first == b'&' {
            if name.is_empty() {
                return Err(RigidError::malformed(position, "anchor name must not be empty"));
            }
            if props.anchor.is_some() {
                return Err(RigidError::malformed(position, "a node can define only one anchor"));
            }
            props.anchor = Some(name.to_string());
        } else {
            if props.tag.is_some() {
                return Err(RigidError::malformed(position, "a node can carry only one tag"));
            }
            props.tag = Some(format!("!{name}"));
        }
        props.position.get_or_insert(position);
        pos += 1 + len;
    }
    Ok((props, pos))
}

fn flow_token_len(text: &str) -> usize {
    text.find(|c: char| c.is_whitespace() || matches!(c, ',' | '[' | ']' | '{' | '}'))
        .unwrap_or(text.len())
}

/// Scans a quoted scalar starting at byte `start` (the opening quote).
/// Returns the unescaped value and the byte offset after the closing quote.
fn scan_quoted(text: &str, start: usize, line: usize) -> Result<(String, usize), RigidError> {
    let bytes = text.as_bytes();
    let quote = bytes[start];
    let mut out = String::new();
    let mut chars = text[start + 1..].char_indices().peekable();
    let error = |offset: usize, detail: String| {
        RigidError::malformed(Position::new(line, column_of(text, offset)), detail)
    };

    while let Some((offset, ch)) = chars.next() {
        let at = start + 1 + offset;
        if quote == b'\'' {
            if ch == '\'' {
                if chars.peek().map(|(_, c)| *c) == Some('\'') {
                    chars.next();
                    out.push('\'');
                    continue;
                }
                return Ok((out, at + 1));
            }
            out.push(ch);
            continue;
        }

        match ch {
            '"' => return Ok((out, at + 1)),
            '\\' => {
                let Some((_, escape)) = chars.next() else {
                    break;
                };
                let simple = match escape {
                    'n' => Some('\n'),
                    't' | '\t' => Some('\t'),
                    'r' => Some('\r'),
                    '0' => Some('\0'),
                    'a' => Some('\u{7}'),
                    'b' => Some('\u{8}'),
                    'e' => Some('\u{1b}'),
                    'f' => Some('\u{c}'),
                    'v' => Some('\u{b}'),
                    ' ' => Some(' '),
                    '/' => Some('/'),
                    '\\' => Some('\\'),
                    '"' => Some('"'),
                    'N' => Some('\u{85}'),
                    '_' => Some('\u{a0}'),
                    _ => None,
                };
                if let Some(c) = simple {
                    out.push(c);
                    continue;
                }
                let width = match escape {
                    'x' => 2,
                    'u' => 4,
                    'U' => 8,
                    other => return Err(error(at, format!("invalid escape sequence \"\\{other}\""))),
                };
                let mut code = String::new();
                for _ in 0..width {
                    match chars.next() {
                        Some((_, digit)) if digit.is_ascii_hexdigit() => code.push(digit),
                        _ => return Err(error(at, "invalid hexadecimal escape sequence".to_string())),
                    }
                }
                let decoded = u32::from_str_radix(&code, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| error(at, format!("invalid unicode escape \"\\{escape}{code}\"")))?;
                out.push(decoded);
            }
            _ => out.push(ch),
        }
    }

    Err(error(start, "unterminated quoted scalar: missing closing quote".to_string()))
}

/// Byte index of the `:` separating a block mapping key from its value.
fn find_mapping_colon(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut i = 0usize;
    match bytes.first() {
        Some(b'"' | b'\'') => {
            let (_, end) = scan_quoted(input, 0, 0).ok()?;
            i = end;
        }
        Some(b'[' | b'{') | None => return None,
        Some(_) => {}
    }
    while i < bytes.len() {
        match bytes[i] {
            b':' if matches!(bytes.get(i + 1), None | Some(b' ' | b'\t')) => return Some(i),
            b'#' if i > 0 && matches!(bytes[i - 1], b' ' | b'\t') => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Sequence item content that opens a nested block on the same line.
fn is_compact_block(rest: &str) -> bool {
    is_sequence_entry(rest)
        || (!matches!(rest.as_bytes()[0], b'&' | b'!' | b'*')
            && find_mapping_colon(rest).is_some())
}

fn check_plain(value: &str, position: Position) -> Result<(), RigidError> {
    if let Some(first @ ('@' | '`')) = value.chars().next() {
        return Err(RigidError::malformed(
            position,
            format!("found character '{first}' that cannot start any token"),
        ));
    }
    if is_sequence_entry(value) {
        return Err(RigidError::malformed(
            position,
            "block sequence entries are not allowed in this context",
        ));
    }
    if find_mapping_colon(value).is_some() {
        return Err(RigidError::malformed(
            position,
            "mapping values are not allowed in this context",
        ));
    }
    Ok(())
}

/// Reads a `|` or `>` header with optional chomping and indentation
/// indicators in either order. Other text is not a block scalar.
fn block_header(raw: &str, position: Position) -> Result<Option<BlockHeader>, RigidError> {
    let folded = match raw.chars().next() {
        Some('|') => false,
        Some('>') => true,
        _ => return Ok(None),
    };

    let mut header = BlockHeader {
        folded,
        chomping: Chomping::Clip,
        indent: None,
    };
    for indicator in raw[1..].chars() {
        match indicator {
            '-' => header.chomping = Chomping::Strip,
            '+' => header.chomping = Chomping::Keep,
            '1'..='9' => header.indent = indicator.to_digit(10).map(|digit| digit as usize),
            _ => {
                return Err(RigidError::malformed(
                    position,
                    format!("invalid block scalar header {raw:?}"),
                ))
            }
        }
    }
    Ok(Some(header))
}

/// Folds `>` content: a break between two text lines becomes a space, a
/// blank line becomes a newline, and lines indented past the content
/// keep their breaks.
fn fold_lines(lines: &[String]) -> String {
    let mut folded = String::new();
    let mut previous: Option<&str> = None;
    for line in lines {
        match previous {
            None => {}
            Some(_) if line.is_empty() => folded.push('\n'),
            Some("") => {}
            Some(prev) if is_indented(prev) || is_indented(line) => folded.push('\n'),
            Some(_) => folded.push(' '),
        }
        folded.push_str(line);
        previous = Some(line.as_str());
    }
    folded
}

fn is_indented(line: &str) -> bool {
    line.starts_with([' ', '\t'])
}

/// Drops a trailing `# comment` and surrounding whitespace.
fn strip_comment(input: &str) -> &str {
    let bytes = input.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || matches!(bytes[i - 1], b' ' | b'\t')) {
            return input[..i].trim();
        }
    }
    input.trim()
}

fn is_sequence_entry(text: &str) -> bool {
    text == "-" || text.starts_with("- ") || text.starts_with("-\t")
}

fn column_of(text: &str, byte: usize) -> usize {
    text[..byte].chars().count() + 1
}

fn whitespace_len(text: &str) -> usize {
    text.len() - text.trim_start_matches([' ', '\t']).len()
}

fn leading_spaces(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b' ').count()
}

fn is_ignorable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}
