pub mod error {
    use thiserror::Error;

    pub type MetadataResult<T> = Result<T, MetadataError>;

    /// Failures surfaced by the metadata query pipeline.
    ///
    /// Everything except `CollectionLookup` is caused by the caller's input and
    /// maps to a 4xx-style response; lookup failures map to 5xx.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum MetadataError {
        #[error("invalid LIKE pattern '{pattern}': {reason}")]
        InvalidPattern { pattern: String, reason: String },

        #[error("syntax error at position {position} near '{fragment}': {message}")]
        Syntax {
            position: usize,
            fragment: String,
            message: String,
        },

        #[error("unsupported statement: {statement}")]
        UnsupportedStatement { statement: String },

        #[error("collection lookup failed in {operation}: {message}")]
        CollectionLookup { operation: String, message: String },
    }

    impl MetadataError {
        pub fn lookup(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
            MetadataError::CollectionLookup {
                operation: operation.into(),
                message: format!("{:#}", err),
            }
        }

        pub fn is_client_error(&self) -> bool {
            !matches!(self, MetadataError::CollectionLookup { .. })
        }

        pub fn status_code(&self) -> u16 {
            if self.is_client_error() { 400 } else { 500 }
        }

        pub fn error_type(&self) -> &'static str {
            match self {
                MetadataError::InvalidPattern { .. } => "InvalidPatternError",
                MetadataError::Syntax { .. } => "SyntaxError",
                MetadataError::UnsupportedStatement { .. } => "UnsupportedStatementError",
                MetadataError::CollectionLookup { .. } => "CollectionLookupError",
            }
        }
    }
}

pub mod like {
    //! SQL LIKE patterns over collection and field names.
    //!
    //! `%` matches any run of characters (including none) and `_` matches
    //! exactly one character. An optional escape character makes the next
    //! `%`, `_` or escape character literal.

    use crate::error::{MetadataError, MetadataResult};
    use std::fmt;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct LikeOptions {
        pub case_insensitive: bool,
        pub escape: Option<char>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Token {
        Char(char),
        One,
        Any,
    }

    #[derive(Debug, Clone)]
    pub struct LikePattern {
        source: String,
        tokens: Vec<Token>,
        case_insensitive: bool,
    }

    impl LikePattern {
        pub fn compile(pattern: &str) -> MetadataResult<Self> {
            Self::compile_with(pattern, &LikeOptions::default())
        }

        pub fn compile_with(pattern: &str, options: &LikeOptions) -> MetadataResult<Self> {
            if pattern.is_empty() {
                return Err(invalid(pattern, "pattern is empty".to_string()));
            }
            let mut tokens = Vec::with_capacity(pattern.len());
            let mut chars = pattern.chars();
            while let Some(c) = chars.next() {
                if Some(c) == options.escape {
                    match chars.next() {
                        Some(next) if next == '%' || next == '_' || Some(next) == options.escape => {
                            tokens.push(Token::Char(next));
                        }
                        Some(next) => {
                            return Err(invalid(
                                pattern,
                                format!("invalid escape sequence '{}{}'", c, next),
                            ));
                        }
                        None => return Err(invalid(pattern, "unterminated escape".to_string())),
                    }
                    continue;
                }
                match c {
                    // consecutive `%` collapse into one
                    '%' if tokens.last() == Some(&Token::Any) => {}
                    '%' => tokens.push(Token::Any),
                    '_' => tokens.push(Token::One),
                    _ => tokens.push(Token::Char(c)),
                }
            }
            Ok(LikePattern {
                source: pattern.to_string(),
                tokens,
                case_insensitive: options.case_insensitive,
            })
        }

        pub fn source(&self) -> &str {
            &self.source
        }

        pub fn is_literal(&self) -> bool {
            self.tokens.iter().all(|t| matches!(t, Token::Char(_)))
        }

        /// The unescaped text of a wildcard-free pattern.
        pub fn literal(&self) -> Option<String> {
            self.tokens
                .iter()
                .map(|t| match t {
                    Token::Char(c) => Some(*c),
                    _ => None,
                })
                .collect()
        }

        pub fn matches(&self, candidate: &str) -> bool {
            // fold per char pair so `_` always consumes one candidate char
            let text: Vec<char> = candidate.chars().collect();
            let tokens = &self.tokens;
            let (mut t, mut p) = (0usize, 0usize);
            // last `%` seen and the text position it was tried from
            let mut backtrack: Option<(usize, usize)> = None;
            while t < text.len() {
                match tokens.get(p) {
                    Some(Token::Any) => {
                        backtrack = Some((p, t));
                        p += 1;
                    }
                    Some(Token::One) => {
                        t += 1;
                        p += 1;
                    }
                    Some(Token::Char(c)) if self.char_eq(*c, text[t]) => {
                        t += 1;
                        p += 1;
                    }
                    _ => match backtrack {
                        Some((star, from)) => {
                            backtrack = Some((star, from + 1));
                            p = star + 1;
                            t = from + 1;
                        }
                        None => return false,
                    },
                }
            }
            tokens[p..].iter().all(|tok| *tok == Token::Any)
        }

        fn char_eq(&self, pattern: char, candidate: char) -> bool {
            pattern == candidate
                || (self.case_insensitive && pattern.to_lowercase().eq(candidate.to_lowercase()))
        }
    }

    impl fmt::Display for LikePattern {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.source)
        }
    }

    fn invalid(pattern: &str, reason: String) -> MetadataError {
        MetadataError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        }
    }
}

pub mod statement {
    //! Recognizes the two metadata statement forms:
    //!
    //! - `SHOW TABLES LIKE <pattern>`
    //! - `DESCRIBE | DESC TABLES LIKE <pattern> [COLUMNS LIKE <pattern>]`
    //!
    //! Keywords are matched case-insensitively; patterns keep their case.

    use crate::error::{MetadataError, MetadataResult};
    use crate::like::{LikeOptions, LikePattern};
    use serde::Serialize;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    #[serde(rename_all = "lowercase")]
    pub enum StatementKind {
        Show,
        Describe,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StatementIntent {
        ShowTables {
            collection_pattern: String,
        },
        DescribeTables {
            collection_pattern: String,
            column_pattern: Option<String>,
        },
    }

    impl StatementIntent {
        pub fn kind(&self) -> StatementKind {
            match self {
                StatementIntent::ShowTables { .. } => StatementKind::Show,
                StatementIntent::DescribeTables { .. } => StatementKind::Describe,
            }
        }

        pub fn collection_pattern(&self) -> &str {
            match self {
                StatementIntent::ShowTables { collection_pattern }
                | StatementIntent::DescribeTables {
                    collection_pattern, ..
                } => collection_pattern,
            }
        }

        pub fn column_pattern(&self) -> Option<&str> {
            match self {
                StatementIntent::ShowTables { .. } => None,
                StatementIntent::DescribeTables { column_pattern, .. } => column_pattern.as_deref(),
            }
        }
    }

    pub fn recognize(sql: &str) -> MetadataResult<StatementIntent> {
        recognize_with(sql, &LikeOptions::default())
    }

    /// Classify `sql`, validating every extracted pattern against `options`.
    pub fn recognize_with(sql: &str, options: &LikeOptions) -> MetadataResult<StatementIntent> {
        let body = sql.trim_end();
        let body = body.strip_suffix(';').unwrap_or(body);
        let tokens = tokenize(body)?;
        let mut cursor = Cursor {
            tokens: &tokens,
            index: 0,
            end: body.len(),
        };

        let kind = match cursor.peek() {
            None => {
                return Err(MetadataError::Syntax {
                    position: 0,
                    fragment: String::new(),
                    message: "empty statement".to_string(),
                });
            }
            Some(t) if t.is_keyword("SHOW") => StatementKind::Show,
            Some(t) if t.is_keyword("DESCRIBE") || t.is_keyword("DESC") => StatementKind::Describe,
            Some(_) => return Err(unsupported(sql)),
        };
        cursor.advance();
        match cursor.peek() {
            Some(t) if t.is_keyword("TABLES") => cursor.advance(),
            _ => return Err(unsupported(sql)),
        }

        cursor.expect_keyword("LIKE")?;
        let collection_pattern = cursor.pattern(options)?;

        let intent = match kind {
            StatementKind::Show => StatementIntent::ShowTables { collection_pattern },
            StatementKind::Describe => {
                let column_pattern = if cursor.peek().is_some_and(|t| t.is_keyword("COLUMNS")) {
                    cursor.advance();
                    cursor.expect_keyword("LIKE")?;
                    Some(cursor.pattern(options)?)
                } else {
                    None
                };
                StatementIntent::DescribeTables {
                    collection_pattern,
                    column_pattern,
                }
            }
        };
        cursor.expect_end()?;
        Ok(intent)
    }

    #[derive(Debug)]
    struct Token {
        text: String,
        position: usize,
        quoted: bool,
    }

    impl Token {
        fn is_keyword(&self, keyword: &str) -> bool {
            !self.quoted && self.text.eq_ignore_ascii_case(keyword)
        }
    }

    fn tokenize(body: &str) -> MetadataResult<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut chars = body.char_indices().peekable();
        while let Some(&(start, c)) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
                continue;
            }
            if c == '\'' {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == '\'' {
                        // '' inside a quoted pattern is a literal quote
                        if matches!(chars.peek(), Some((_, '\''))) {
                            chars.next();
                            text.push('\'');
                            continue;
                        }
                        closed = true;
                        break;
                    }
                    text.push(c);
                }
                if !closed {
                    return Err(MetadataError::Syntax {
                        position: start,
                        fragment: body[start..].to_string(),
                        message: "unterminated quoted pattern".to_string(),
                    });
                }
                if let Some(&(next, c)) = chars.peek() {
                    if !c.is_whitespace() {
                        return Err(MetadataError::Syntax {
                            position: next,
                            fragment: c.to_string(),
                            message: "expected whitespace after quoted pattern".to_string(),
                        });
                    }
                }
                tokens.push(Token {
                    text,
                    position: start,
                    quoted: true,
                });
                continue;
            }
            let mut end = body.len();
            while let Some(&(i, c)) = chars.peek() {
                if c.is_whitespace() {
                    end = i;
                    break;
                }
                chars.next();
            }
            tokens.push(Token {
                text: body[start..end].to_string(),
                position: start,
                quoted: false,
            });
        }
        Ok(tokens)
    }

    struct Cursor<'a> {
        tokens: &'a [Token],
        index: usize,
        end: usize,
    }

    impl<'a> Cursor<'a> {
        fn peek(&self) -> Option<&'a Token> {
            self.tokens.get(self.index)
        }

        fn advance(&mut self) {
            self.index += 1;
        }

        fn expect_keyword(&mut self, keyword: &str) -> MetadataResult<()> {
            match self.peek() {
                Some(t) if t.is_keyword(keyword) => {
                    self.advance();
                    Ok(())
                }
                Some(t) => Err(MetadataError::Syntax {
                    position: t.position,
                    fragment: t.text.clone(),
                    message: format!("expected {}", keyword),
                }),
                None => Err(self.missing(&format!("expected {}", keyword))),
            }
        }

        fn pattern(&mut self, options: &LikeOptions) -> MetadataResult<String> {
            let token = self.peek().ok_or_else(|| self.missing("expected a LIKE pattern"))?;
            LikePattern::compile_with(&token.text, options)?;
            self.advance();
            Ok(token.text.clone())
        }

        fn expect_end(&self) -> MetadataResult<()> {
            match self.peek() {
                None => Ok(()),
                Some(t) => Err(MetadataError::Syntax {
                    position: t.position,
                    fragment: t.text.clone(),
                    message: "unexpected trailing content".to_string(),
                }),
            }
        }

        fn missing(&self, message: &str) -> MetadataError {
            MetadataError::Syntax {
                position: self.end,
                fragment: String::new(),
                message: message.to_string(),
            }
        }
    }

    fn unsupported(sql: &str) -> MetadataError {
        MetadataError::UnsupportedStatement {
            statement: sql.trim().to_string(),
        }
    }
}

pub mod types {
    /// `java.sql.Types` codes reported in the DATA_TYPE column.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum JdbcType {
        Null,
        Boolean,
        TinyInt,
        SmallInt,
        Integer,
        BigInt,
        Real,
        Float,
        Double,
        Decimal,
        Numeric,
        Varchar,
        Binary,
        Varbinary,
        Date,
        Time,
        Timestamp,
        Array,
        Struct,
        Other,
    }

    impl JdbcType {
        pub fn code(self) -> i32 {
            match self {
                JdbcType::Null => 0,
                JdbcType::Boolean => 16,
                JdbcType::TinyInt => -6,
                JdbcType::SmallInt => 5,
                JdbcType::Integer => 4,
                JdbcType::BigInt => -5,
                JdbcType::Real => 7,
                JdbcType::Float => 6,
                JdbcType::Double => 8,
                JdbcType::Decimal => 3,
                JdbcType::Numeric => 2,
                JdbcType::Varchar => 12,
                JdbcType::Binary => -2,
                JdbcType::Varbinary => -3,
                JdbcType::Date => 91,
                JdbcType::Time => 92,
                JdbcType::Timestamp => 93,
                JdbcType::Array => 2003,
                JdbcType::Struct => 2002,
                JdbcType::Other => 1111,
            }
        }

        /// Precision for numeric types, display width for temporal ones.
        pub fn default_column_size(self) -> Option<i32> {
            match self {
                JdbcType::Boolean => Some(1),
                JdbcType::TinyInt => Some(3),
                JdbcType::SmallInt => Some(5),
                JdbcType::Integer => Some(10),
                JdbcType::BigInt => Some(19),
                JdbcType::Real => Some(7),
                JdbcType::Float | JdbcType::Double => Some(15),
                JdbcType::Date => Some(10),
                JdbcType::Time => Some(18),
                JdbcType::Timestamp => Some(24),
                _ => None,
            }
        }

        pub fn num_prec_radix(self) -> Option<i32> {
            self.is_numeric().then_some(10)
        }

        pub fn is_numeric(self) -> bool {
            matches!(
                self,
                JdbcType::TinyInt
                    | JdbcType::SmallInt
                    | JdbcType::Integer
                    | JdbcType::BigInt
                    | JdbcType::Real
                    | JdbcType::Float
                    | JdbcType::Double
                    | JdbcType::Decimal
                    | JdbcType::Numeric
            )
        }

        pub fn is_character(self) -> bool {
            matches!(self, JdbcType::Varchar)
        }

        /// Map a CQL type as written in `system_schema.columns.type`.
        pub fn from_cql(type_text: &str) -> Self {
            let ty = type_text.trim().to_ascii_lowercase();
            let ty = ty
                .strip_prefix("frozen<")
                .and_then(|inner| inner.strip_suffix('>'))
                .unwrap_or(&ty);
            if ty.starts_with("list<") || ty.starts_with("set<") || ty.starts_with("vector<") {
                return JdbcType::Array;
            }
            if ty.starts_with("map<") || ty.starts_with("tuple<") {
                return JdbcType::Other;
            }
            match ty {
                "ascii" | "text" | "varchar" => JdbcType::Varchar,
                "boolean" => JdbcType::Boolean,
                "tinyint" => JdbcType::TinyInt,
                "smallint" => JdbcType::SmallInt,
                "int" => JdbcType::Integer,
                "bigint" | "counter" => JdbcType::BigInt,
                "float" => JdbcType::Real,
                "double" => JdbcType::Double,
                "decimal" => JdbcType::Decimal,
                "varint" => JdbcType::Numeric,
                "blob" => JdbcType::Varbinary,
                "date" => JdbcType::Date,
                "time" => JdbcType::Time,
                "timestamp" => JdbcType::Timestamp,
                "uuid" | "timeuuid" | "inet" | "duration" | "" => JdbcType::Other,
                // anything else is a user-defined type
                _ => JdbcType::Struct,
            }
        }
    }

    /// DECIMAL_DIGITS for a CQL type: fractional-second digits for temporal
    /// types, zero for integers, unknown for `decimal` and everything else.
    pub fn cql_decimal_digits(type_text: &str) -> Option<i32> {
        match type_text.trim().to_ascii_lowercase().as_str() {
            "tinyint" | "smallint" | "int" | "bigint" | "counter" | "varint" => Some(0),
            "timestamp" => Some(3),
            "time" => Some(9),
            _ => None,
        }
    }
}

pub mod catalog {
    use crate::error::{MetadataError, MetadataResult};
    use crate::types::JdbcType;
    use serde::Serialize;
    use tokio::sync::RwLock;

    pub const BASE_TABLE: &str = "BASE TABLE";

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct CollectionDescriptor {
        pub schema: Option<String>,
        pub name: String,
        pub table_type: String,
        pub remarks: Option<String>,
    }

    impl CollectionDescriptor {
        pub fn new(name: impl Into<String>) -> Self {
            CollectionDescriptor {
                schema: None,
                name: name.into(),
                table_type: BASE_TABLE.to_string(),
                remarks: None,
            }
        }

        pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
            self.schema = Some(schema.into());
            self
        }

        pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
            self.remarks = Some(remarks.into());
            self
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub enum Nullability {
        NoNulls,
        Nullable,
        Unknown,
    }

    impl Nullability {
        /// `DatabaseMetaData.columnNoNulls` / `columnNullable` / `columnNullableUnknown`.
        pub fn jdbc_code(self) -> i32 {
            match self {
                Nullability::NoNulls => 0,
                Nullability::Nullable => 1,
                Nullability::Unknown => 2,
            }
        }

        pub fn label(self) -> Option<&'static str> {
            match self {
                Nullability::NoNulls => Some("NO"),
                Nullability::Nullable => Some("YES"),
                Nullability::Unknown => None,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct FieldDescriptor {
        pub name: String,
        pub data_type: i32,
        pub type_name: String,
        pub column_size: Option<i32>,
        pub decimal_digits: Option<i32>,
        pub num_prec_radix: Option<i32>,
        pub nullable: Nullability,
        pub remarks: Option<String>,
        pub default_value: Option<String>,
        pub ordinal_position: i32,
        pub is_auto_increment: bool,
        pub is_generated: bool,
    }

    impl FieldDescriptor {
        /// A nullable field whose size and radix default from `jdbc_type`.
        pub fn new(
            name: impl Into<String>,
            jdbc_type: JdbcType,
            type_name: impl Into<String>,
            ordinal_position: i32,
        ) -> Self {
            FieldDescriptor {
                name: name.into(),
                data_type: jdbc_type.code(),
                type_name: type_name.into(),
                column_size: jdbc_type.default_column_size(),
                decimal_digits: None,
                num_prec_radix: jdbc_type.num_prec_radix(),
                nullable: Nullability::Nullable,
                remarks: None,
                default_value: None,
                ordinal_position,
                is_auto_increment: false,
                is_generated: false,
            }
        }

        pub fn with_nullability(mut self, nullable: Nullability) -> Self {
            self.nullable = nullable;
            self
        }

        pub fn with_column_size(mut self, size: Option<i32>) -> Self {
            self.column_size = size;
            self
        }

        pub fn with_decimal_digits(mut self, digits: Option<i32>) -> Self {
            self.decimal_digits = digits;
            self
        }

        pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
            self.remarks = Some(remarks.into());
            self
        }

        pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
            self.default_value = Some(default_value.into());
            self
        }

        pub fn auto_increment(mut self, yes: bool) -> Self {
            self.is_auto_increment = yes;
            self
        }

        pub fn generated(mut self, yes: bool) -> Self {
            self.is_generated = yes;
            self
        }
    }

    /// Storage collaborator consulted by the resolver.
    ///
    /// `name_pattern` is a pushdown hint only: implementations may ignore it,
    /// and the resolver always re-applies the pattern itself.
    #[async_trait::async_trait]
    pub trait CatalogSource: Send + Sync {
        async fn list_collections(
            &self,
            name_pattern: Option<&str>,
        ) -> MetadataResult<Vec<CollectionDescriptor>>;

        /// Fields of `collection`, ordered by ordinal position.
        async fn list_fields(&self, collection: &str) -> MetadataResult<Vec<FieldDescriptor>>;

        async fn cluster_name(&self) -> MetadataResult<String>;

        /// Whether `list_collections` returns a meaningful order. When it does
        /// not, resolved collections are sorted by name.
        fn preserves_order(&self) -> bool {
            true
        }
    }

    type Entry = (CollectionDescriptor, Vec<FieldDescriptor>);

    pub struct MemoryCatalog {
        cluster_name: String,
        collections: RwLock<Vec<Entry>>,
        ordered: bool,
    }

    impl MemoryCatalog {
        pub fn new(cluster_name: impl Into<String>) -> Self {
            MemoryCatalog {
                cluster_name: cluster_name.into(),
                collections: RwLock::new(Vec::new()),
                ordered: true,
            }
        }

        pub fn with_collection(
            mut self,
            collection: CollectionDescriptor,
            fields: Vec<FieldDescriptor>,
        ) -> Self {
            upsert(self.collections.get_mut(), collection, fields);
            self
        }

        /// Report listing order as undefined.
        pub fn with_unordered_listing(mut self) -> Self {
            self.ordered = false;
            self
        }

        pub async fn insert_collection(
            &self,
            collection: CollectionDescriptor,
            fields: Vec<FieldDescriptor>,
        ) {
            upsert(&mut *self.collections.write().await, collection, fields);
        }

        pub async fn remove_collection(&self, name: &str) -> bool {
            let mut guard = self.collections.write().await;
            let before = guard.len();
            guard.retain(|(c, _)| c.name != name);
            guard.len() != before
        }
    }

    fn upsert(entries: &mut Vec<Entry>, collection: CollectionDescriptor, fields: Vec<FieldDescriptor>) {
        match entries.iter_mut().find(|(c, _)| c.name == collection.name) {
            Some(entry) => *entry = (collection, fields),
            None => entries.push((collection, fields)),
        }
    }

    #[async_trait::async_trait]
    impl CatalogSource for MemoryCatalog {
        async fn list_collections(
            &self,
            _name_pattern: Option<&str>,
        ) -> MetadataResult<Vec<CollectionDescriptor>> {
            Ok(self
                .collections
                .read()
                .await
                .iter()
                .map(|(c, _)| c.clone())
                .collect())
        }

        async fn list_fields(&self, collection: &str) -> MetadataResult<Vec<FieldDescriptor>> {
            self.collections
                .read()
                .await
                .iter()
                .find(|(c, _)| c.name == collection)
                .map(|(_, fields)| fields.clone())
                .ok_or_else(|| {
                    MetadataError::lookup("list_fields", format!("no such collection '{}'", collection))
                })
        }

        async fn cluster_name(&self) -> MetadataResult<String> {
            Ok(self.cluster_name.clone())
        }

        fn preserves_order(&self) -> bool {
            self.ordered
        }
    }
}

pub mod resolver {
    use crate::catalog::{CatalogSource, CollectionDescriptor, FieldDescriptor};
    use crate::error::{MetadataError, MetadataResult};
    use crate::like::LikePattern;
    use std::future::Future;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::task::JoinSet;
    use tracing::{debug, warn};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResolverOptions {
        pub lookup_timeout: Duration,
        pub max_concurrent_lookups: usize,
    }

    impl Default for ResolverOptions {
        fn default() -> Self {
            ResolverOptions {
                lookup_timeout: Duration::from_millis(crate::config::DEFAULT_LOOKUP_TIMEOUT_MS),
                max_concurrent_lookups: crate::config::DEFAULT_MAX_CONCURRENT_LOOKUPS,
            }
        }
    }

    pub struct MetadataResolver {
        source: Arc<dyn CatalogSource>,
        options: ResolverOptions,
    }

    impl MetadataResolver {
        pub fn new(source: Arc<dyn CatalogSource>, options: ResolverOptions) -> Self {
            MetadataResolver { source, options }
        }

        pub async fn resolve_show(
            &self,
            pattern: &LikePattern,
        ) -> MetadataResult<Vec<CollectionDescriptor>> {
            let candidates = bounded(
                self.options.lookup_timeout,
                "list_collections",
                self.source.list_collections(Some(pattern.source())),
            )
            .await?;
            let total = candidates.len();
            let mut matched: Vec<CollectionDescriptor> = candidates
                .into_iter()
                .filter(|c| pattern.matches(&c.name))
                .collect();
            if !self.source.preserves_order() {
                matched.sort_by(|a, b| a.name.cmp(&b.name));
            }
            debug!(pattern = %pattern, candidates = total, matched = matched.len(), "resolved collections");
            Ok(matched)
        }

        /// One entry per (collection, field) pair matching both patterns.
        ///
        /// Field lookups run concurrently; output order is collection order,
        /// then ordinal position.
        pub async fn resolve_describe(
            &self,
            collection_pattern: &LikePattern,
            column_pattern: &LikePattern,
        ) -> MetadataResult<Vec<(CollectionDescriptor, FieldDescriptor)>> {
            let collections = self.resolve_show(collection_pattern).await?;
            if collections.is_empty() {
                return Ok(Vec::new());
            }

            let permits = Arc::new(Semaphore::new(self.options.max_concurrent_lookups.max(1)));
            let mut tasks = JoinSet::new();
            for (index, collection) in collections.iter().enumerate() {
                let source = Arc::clone(&self.source);
                let permits = Arc::clone(&permits);
                let name = collection.name.clone();
                let timeout = self.options.lookup_timeout;
                tasks.spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| MetadataError::lookup("list_fields", e))?;
                    let fields = bounded(timeout, "list_fields", source.list_fields(&name)).await?;
                    Ok::<_, MetadataError>((index, fields))
                });
            }

            let mut per_collection: Vec<Vec<FieldDescriptor>> = vec![Vec::new(); collections.len()];
            while let Some(joined) = tasks.join_next().await {
                let (index, fields) = joined.map_err(|e| MetadataError::lookup("list_fields", e))??;
                per_collection[index] = fields;
            }

            let mut pairs = Vec::new();
            for (collection, mut fields) in collections.into_iter().zip(per_collection) {
                fields.sort_by_key(|f| f.ordinal_position);
                for field in fields.into_iter().filter(|f| column_pattern.matches(&f.name)) {
                    pairs.push((collection.clone(), field));
                }
            }
            debug!(columns = %column_pattern, matched = pairs.len(), "resolved fields");
            Ok(pairs)
        }
    }

    /// Run a collaborator call under `timeout`.
    pub(crate) async fn bounded<T>(
        timeout: Duration,
        operation: &'static str,
        lookup: impl Future<Output = MetadataResult<T>>,
    ) -> MetadataResult<T> {
        match tokio::time::timeout(timeout, lookup).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(operation, error = %err, "catalog lookup failed");
                Err(err)
            }
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                warn!(operation, timeout_ms, "catalog lookup timed out");
                Err(MetadataError::CollectionLookup {
                    operation: operation.to_string(),
                    message: format!("timed out after {} ms", timeout_ms),
                })
            }
        }
    }
}

pub mod format {
    use crate::catalog::{CollectionDescriptor, FieldDescriptor};
    use serde::Serialize;

    pub const SHOW_WIDTH: usize = 10;
    pub const DESCRIBE_WIDTH: usize = 24;

    /// A single response cell. `Null` serializes as JSON `null`.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    #[serde(untagged)]
    pub enum Cell {
        Null,
        Keyword(String),
        Integer(i32),
        Short(i16),
    }

    impl Cell {
        pub fn keyword(value: impl Into<String>) -> Self {
            Cell::Keyword(value.into())
        }

        pub fn is_null(&self) -> bool {
            matches!(self, Cell::Null)
        }

        pub fn as_str(&self) -> Option<&str> {
            match self {
                Cell::Keyword(s) => Some(s),
                _ => None,
            }
        }

        pub fn as_i64(&self) -> Option<i64> {
            match self {
                Cell::Integer(v) => Some(i64::from(*v)),
                Cell::Short(v) => Some(i64::from(*v)),
                _ => None,
            }
        }
    }

    fn opt_keyword(value: Option<&str>) -> Cell {
        value.map_or(Cell::Null, Cell::keyword)
    }

    fn opt_integer(value: Option<i32>) -> Cell {
        value.map_or(Cell::Null, Cell::Integer)
    }

    fn yes_no(flag: bool) -> Cell {
        Cell::keyword(if flag { "YES" } else { "NO" })
    }

    /// Fixed-width row; only built from arrays of exactly 10 or 24 cells.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    #[serde(transparent)]
    pub struct MetadataRow(Vec<Cell>);

    impl MetadataRow {
        pub fn show(cells: [Cell; SHOW_WIDTH]) -> Self {
            MetadataRow(cells.into())
        }

        pub fn describe(cells: [Cell; DESCRIBE_WIDTH]) -> Self {
            MetadataRow(cells.into())
        }

        pub fn len(&self) -> usize {
            self.0.len()
        }

        pub fn is_empty(&self) -> bool {
            self.0.is_empty()
        }

        pub fn cells(&self) -> &[Cell] {
            &self.0
        }

        pub fn get(&self, index: usize) -> Option<&Cell> {
            self.0.get(index)
        }
    }

    pub struct RowFormatter {
        cluster_name: String,
    }

    impl RowFormatter {
        pub fn new(cluster_name: impl Into<String>) -> Self {
            RowFormatter {
                cluster_name: cluster_name.into(),
            }
        }

        pub fn cluster_name(&self) -> &str {
            &self.cluster_name
        }

        /// `getTables()` shape.
        pub fn show_row(&self, collection: &CollectionDescriptor) -> MetadataRow {
            MetadataRow::show([
                Cell::keyword(self.cluster_name.as_str()),
                opt_keyword(collection.schema.as_deref()),
                Cell::keyword(collection.name.as_str()),
                Cell::keyword(collection.table_type.as_str()),
                opt_keyword(collection.remarks.as_deref()),
                Cell::Null,
                Cell::Null,
                Cell::Null,
                Cell::Null,
                Cell::Null,
            ])
        }

        /// `getColumns()` shape.
        pub fn describe_row(
            &self,
            collection: &CollectionDescriptor,
            field: &FieldDescriptor,
        ) -> MetadataRow {
            let char_octet_length = if is_character_code(field.data_type) {
                opt_integer(field.column_size)
            } else {
                Cell::Null
            };
            MetadataRow::describe([
                Cell::keyword(self.cluster_name.as_str()),
                opt_keyword(collection.schema.as_deref()),
                Cell::keyword(collection.name.as_str()),
                Cell::keyword(field.name.as_str()),
                Cell::Integer(field.data_type),
                Cell::keyword(field.type_name.as_str()),
                opt_integer(field.column_size),
                Cell::Null,
                opt_integer(field.decimal_digits),
                opt_integer(field.num_prec_radix),
                Cell::Integer(field.nullable.jdbc_code()),
                opt_keyword(field.remarks.as_deref()),
                opt_keyword(field.default_value.as_deref()),
                Cell::Null,
                Cell::Null,
                char_octet_length,
                Cell::Integer(field.ordinal_position),
                opt_keyword(field.nullable.label()),
                Cell::Null,
                Cell::Null,
                Cell::Null,
                Cell::Null,
                yes_no(field.is_auto_increment),
                yes_no(field.is_generated),
            ])
        }
    }

    // CHAR, VARCHAR, LONGVARCHAR, NCHAR, NVARCHAR, LONGNVARCHAR
    fn is_character_code(code: i32) -> bool {
        matches!(code, 1 | 12 | -1 | -15 | -9 | -16)
    }
}

pub mod response {
    use crate::error::MetadataError;
    use crate::format::{MetadataRow, DESCRIBE_WIDTH, SHOW_WIDTH};
    use crate::statement::StatementKind;
    use serde::Serialize;
    use serde_json::Value;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ColumnType {
        Keyword,
        Integer,
        Short,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct SchemaField {
        pub name: &'static str,
        #[serde(rename = "type")]
        pub column_type: ColumnType,
    }

    const fn keyword(name: &'static str) -> SchemaField {
        SchemaField {
            name,
            column_type: ColumnType::Keyword,
        }
    }

    const fn integer(name: &'static str) -> SchemaField {
        SchemaField {
            name,
            column_type: ColumnType::Integer,
        }
    }

    const fn short(name: &'static str) -> SchemaField {
        SchemaField {
            name,
            column_type: ColumnType::Short,
        }
    }

    pub const SHOW_SCHEMA: [SchemaField; SHOW_WIDTH] = [
        keyword("TABLE_CAT"),
        keyword("TABLE_SCHEM"),
        keyword("TABLE_NAME"),
        keyword("TABLE_TYPE"),
        keyword("REMARKS"),
        keyword("TYPE_CAT"),
        keyword("TYPE_SCHEM"),
        keyword("TYPE_NAME"),
        keyword("SELF_REFERENCING_COL_NAME"),
        keyword("REF_GENERATION"),
    ];

    pub const DESCRIBE_SCHEMA: [SchemaField; DESCRIBE_WIDTH] = [
        keyword("TABLE_CAT"),
        keyword("TABLE_SCHEM"),
        keyword("TABLE_NAME"),
        keyword("COLUMN_NAME"),
        integer("DATA_TYPE"),
        keyword("TYPE_NAME"),
        integer("COLUMN_SIZE"),
        integer("BUFFER_LENGTH"),
        integer("DECIMAL_DIGITS"),
        integer("NUM_PREC_RADIX"),
        integer("NULLABLE"),
        keyword("REMARKS"),
        keyword("COLUMN_DEF"),
        integer("SQL_DATA_TYPE"),
        integer("SQL_DATETIME_SUB"),
        integer("CHAR_OCTET_LENGTH"),
        integer("ORDINAL_POSITION"),
        keyword("IS_NULLABLE"),
        keyword("SCOPE_CATALOG"),
        keyword("SCOPE_SCHEMA"),
        keyword("SCOPE_TABLE"),
        short("SOURCE_DATA_TYPE"),
        keyword("IS_AUTOINCREMENT"),
        keyword("IS_GENERATEDCOLUMN"),
    ];

    pub fn schema_for(kind: StatementKind) -> &'static [SchemaField] {
        match kind {
            StatementKind::Show => &SHOW_SCHEMA,
            StatementKind::Describe => &DESCRIBE_SCHEMA,
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct ResponseEnvelope {
        pub schema: Vec<SchemaField>,
        pub datarows: Vec<MetadataRow>,
        pub total: usize,
        pub size: usize,
        pub status: u16,
    }

    impl ResponseEnvelope {
        pub fn column_index(&self, name: &str) -> Option<usize> {
            self.schema.iter().position(|f| f.name == name)
        }

        pub fn to_json(&self) -> Value {
            serde_json::to_value(self).unwrap_or(Value::Null)
        }
    }

    /// Wrap `rows` with the constant schema for `kind`; rows keep their order.
    pub fn assemble(kind: StatementKind, rows: Vec<MetadataRow>) -> ResponseEnvelope {
        let size = rows.len();
        ResponseEnvelope {
            schema: schema_for(kind).to_vec(),
            datarows: rows,
            total: size,
            size,
            status: 200,
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct ErrorBody {
        #[serde(rename = "type")]
        pub error_type: String,
        pub reason: String,
        pub details: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct ErrorEnvelope {
        pub error: ErrorBody,
        pub status: u16,
    }

    impl ErrorEnvelope {
        /// A 400 envelope for malformed request arguments.
        pub fn invalid_argument(details: impl Into<String>) -> Self {
            ErrorEnvelope {
                error: ErrorBody {
                    error_type: "InvalidArgumentError".to_string(),
                    reason: "Invalid request arguments".to_string(),
                    details: details.into(),
                },
                status: 400,
            }
        }

        pub fn to_json(&self) -> Value {
            serde_json::to_value(self).unwrap_or(Value::Null)
        }
    }

    impl From<&MetadataError> for ErrorEnvelope {
        fn from(err: &MetadataError) -> Self {
            let reason = if err.is_client_error() {
                "Invalid SQL query"
            } else {
                "There was internal problem at backend"
            };
            ErrorEnvelope {
                error: ErrorBody {
                    error_type: err.error_type().to_string(),
                    reason: reason.to_string(),
                    details: err.to_string(),
                },
                status: err.status_code(),
            }
        }
    }
}

pub mod config {
    use crate::like::LikeOptions;
    use crate::resolver::ResolverOptions;
    use std::time::Duration;
    use tracing::warn;

    pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5_000;
    pub const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 8;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct EngineConfig {
        pub case_insensitive_identifiers: bool,
        pub like_escape: Option<char>,
        pub lookup_timeout: Duration,
        pub max_concurrent_lookups: usize,
    }

    impl Default for EngineConfig {
        fn default() -> Self {
            EngineConfig {
                case_insensitive_identifiers: false,
                like_escape: None,
                lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
                max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
            }
        }
    }

    impl EngineConfig {
        /// Read `METADATA_*` environment variables, keeping defaults for unset
        /// or unparseable values.
        pub fn from_env() -> Self {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        pub fn from_lookup<F>(lookup: F) -> Self
        where
            F: Fn(&str) -> Option<String>,
        {
            let mut config = EngineConfig::default();
            if let Some(v) = lookup("METADATA_CASE_INSENSITIVE") {
                config.case_insensitive_identifiers = v == "1" || v.eq_ignore_ascii_case("true");
            }
            if let Some(v) = lookup("METADATA_LIKE_ESCAPE") {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !matches!(c, '%' | '_') && !c.is_whitespace() => {
                        config.like_escape = Some(c);
                    }
                    _ => warn!(value = %v, "ignoring METADATA_LIKE_ESCAPE; expected one non-wildcard character"),
                }
            }
            if let Some(v) = lookup("METADATA_LOOKUP_TIMEOUT_MS") {
                match v.parse::<u64>() {
                    Ok(ms) if ms > 0 => config.lookup_timeout = Duration::from_millis(ms),
                    _ => warn!(value = %v, "ignoring METADATA_LOOKUP_TIMEOUT_MS"),
                }
            }
            if let Some(v) = lookup("METADATA_MAX_CONCURRENT_LOOKUPS") {
                match v.parse::<usize>() {
                    Ok(n) if n > 0 => config.max_concurrent_lookups = n,
                    _ => warn!(value = %v, "ignoring METADATA_MAX_CONCURRENT_LOOKUPS"),
                }
            }
            config
        }

        pub fn like_options(&self) -> LikeOptions {
            LikeOptions {
                case_insensitive: self.case_insensitive_identifiers,
                escape: self.like_escape,
            }
        }

        pub fn resolver_options(&self) -> ResolverOptions {
            ResolverOptions {
                lookup_timeout: self.lookup_timeout,
                max_concurrent_lookups: self.max_concurrent_lookups,
            }
        }
    }
}

pub mod engine {
    use crate::catalog::CatalogSource;
    use crate::config::EngineConfig;
    use crate::error::MetadataResult;
    use crate::format::{MetadataRow, RowFormatter};
    use crate::like::LikePattern;
    use crate::resolver::{bounded, MetadataResolver};
    use crate::response::{assemble, ErrorEnvelope, ResponseEnvelope};
    use crate::statement::{recognize_with, StatementIntent};
    use serde_json::Value;
    use std::sync::Arc;
    use tracing::{info, info_span, Instrument};

    pub struct MetadataQueryEngine {
        source: Arc<dyn CatalogSource>,
        resolver: MetadataResolver,
        config: EngineConfig,
    }

    impl MetadataQueryEngine {
        pub fn new(source: Arc<dyn CatalogSource>, config: EngineConfig) -> Self {
            let resolver = MetadataResolver::new(Arc::clone(&source), config.resolver_options());
            MetadataQueryEngine {
                source,
                resolver,
                config,
            }
        }

        pub fn config(&self) -> &EngineConfig {
            &self.config
        }

        pub async fn execute(&self, sql: &str) -> MetadataResult<ResponseEnvelope> {
            let intent = recognize_with(sql, &self.config.like_options())?;
            self.execute_intent(intent).await
        }

        pub async fn execute_intent(&self, intent: StatementIntent) -> MetadataResult<ResponseEnvelope> {
            let kind = intent.kind();
            let span = info_span!("metadata_query", ?kind, tables = intent.collection_pattern());
            async move {
                let options = self.config.like_options();
                let tables = LikePattern::compile_with(intent.collection_pattern(), &options)?;
                let rows: Vec<MetadataRow> = match &intent {
                    StatementIntent::ShowTables { .. } => {
                        let collections = self.resolver.resolve_show(&tables).await?;
                        if collections.is_empty() {
                            Vec::new()
                        } else {
                            let formatter = self.formatter().await?;
                            collections.iter().map(|c| formatter.show_row(c)).collect()
                        }
                    }
                    StatementIntent::DescribeTables { column_pattern, .. } => {
                        // no COLUMNS clause means every field
                        let columns =
                            LikePattern::compile_with(column_pattern.as_deref().unwrap_or("%"), &options)?;
                        let pairs = self.resolver.resolve_describe(&tables, &columns).await?;
                        if pairs.is_empty() {
                            Vec::new()
                        } else {
                            let formatter = self.formatter().await?;
                            pairs
                                .iter()
                                .map(|(c, f)| formatter.describe_row(c, f))
                                .collect()
                        }
                    }
                };
                let envelope = assemble(kind, rows);
                info!(rows = envelope.size, "metadata query complete");
                Ok(envelope)
            }
            .instrument(span)
            .await
        }

        /// Response envelope on success, error envelope otherwise.
        pub async fn execute_json(&self, sql: &str) -> Value {
            match self.execute(sql).await {
                Ok(envelope) => envelope.to_json(),
                Err(err) => ErrorEnvelope::from(&err).to_json(),
            }
        }

        async fn formatter(&self) -> MetadataResult<RowFormatter> {
            let cluster = bounded(
                self.config.lookup_timeout,
                "cluster_name",
                self.source.cluster_name(),
            )
            .await?;
            Ok(RowFormatter::new(cluster))
        }
    }
}

pub mod server {
    #[derive(Debug, Clone, PartialEq)]
    pub struct ServerInfo {
        pub name: &'static str,
        pub version: &'static str,
        pub instructions: &'static str,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Tool {
        pub name: &'static str,
        pub description: &'static str,
    }

    pub fn server_info() -> ServerInfo {
        ServerInfo {
            name: "scylla-sql-metadata",
            version: env!("CARGO_PKG_VERSION"),
            instructions: "Read-only JDBC-style table metadata (SHOW TABLES / DESCRIBE TABLES) for ScyllaDB",
        }
    }

    pub fn list_tools() -> Vec<Tool> {
        vec![
            Tool {
                name: "metadata_query",
                description: "Run SHOW TABLES LIKE or DESCRIBE TABLES LIKE ... [COLUMNS LIKE ...]",
            },
            Tool {
                name: "show_tables",
                description: "List tables whose name matches a SQL LIKE pattern",
            },
            Tool {
                name: "describe_tables",
                description: "Describe columns of tables matching SQL LIKE patterns",
            },
        ]
    }
}

#[cfg(feature = "mcp")]
pub mod mcp {
    use crate::engine::MetadataQueryEngine;
    use crate::response::ErrorEnvelope;
    use crate::statement::StatementIntent;
    use serde_json::{Map, Value};
    use std::sync::Arc;
    use tracing::{Instrument, Level, info, warn};
    use tracing_subscriber::EnvFilter;

    pub async fn run_stdio_server() -> anyhow::Result<()> {
        // stdout carries the MCP transport, so logs go to stderr
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
            .with_writer(std::io::stderr)
            .try_init();

        info!("starting MCP stdio server (rust-mcp-sdk)");
        use rust_mcp_schema::{
            Implementation, InitializeResult, LATEST_PROTOCOL_VERSION, ServerCapabilities,
            ServerCapabilitiesTools,
        };
        use rust_mcp_sdk::mcp_server::server_runtime;
        use rust_mcp_sdk::{MCPServer, StdioTransport, TransportOptions};

        let info = crate::server::server_info();
        let server_details = InitializeResult {
            server_info: Implementation {
                name: info.name.to_string(),
                version: info.version.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools { list_changed: None }),
                ..Default::default()
            },
            meta: None,
            instructions: Some(info.instructions.to_string()),
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
        };

        let scylla_config = crate::db::ScyllaConfig::from_env()?;
        let session = crate::db::connect(&scylla_config).await?;
        let catalog = crate::db::ScyllaCatalog::new(session, scylla_config.keyspace.clone());
        let keyspace = catalog.keyspace().to_string();
        let engine = MetadataQueryEngine::new(Arc::new(catalog), crate::config::EngineConfig::from_env());
        info!(
            keyspace = %keyspace,
            lookup_timeout_ms = engine.config().lookup_timeout.as_millis() as u64,
            max_concurrent_lookups = engine.config().max_concurrent_lookups,
            "metadata engine ready"
        );

        let transport = StdioTransport::new(TransportOptions::default())
            .map_err(|e| anyhow::anyhow!("failed to open stdio transport: {}", e))?;
        let server = server_runtime::create_server(server_details, transport, MetadataHandler::new(engine));
        server
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("MCP server stopped: {}", e))
    }

    /// A parsed tool call: raw statement text, or an intent built from
    /// structured arguments.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ToolRequest {
        Statement(String),
        Intent(StatementIntent),
    }

    pub fn string_arg(args: Option<&Map<String, Value>>, key: &str) -> Option<String> {
        args.and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    pub fn parse_tool_call(name: &str, args: Option<&Map<String, Value>>) -> Result<ToolRequest, String> {
        match name {
            "metadata_query" => string_arg(args, "statement")
                .map(ToolRequest::Statement)
                .ok_or_else(|| "missing required argument 'statement'".to_string()),
            "show_tables" => string_arg(args, "pattern")
                .map(|collection_pattern| {
                    ToolRequest::Intent(StatementIntent::ShowTables { collection_pattern })
                })
                .ok_or_else(|| "missing required argument 'pattern'".to_string()),
            "describe_tables" => {
                let collection_pattern = string_arg(args, "table_pattern")
                    .ok_or_else(|| "missing required argument 'table_pattern'".to_string())?;
                Ok(ToolRequest::Intent(StatementIntent::DescribeTables {
                    collection_pattern,
                    column_pattern: string_arg(args, "column_pattern"),
                }))
            }
            _ => Err(format!("tool '{}' is not supported", name)),
        }
    }

    /// Error envelope text for a tool call whose arguments could not be used.
    pub fn argument_error_json(message: &str) -> String {
        serde_json::to_string(&ErrorEnvelope::invalid_argument(message)).unwrap_or_else(|_| "{}".into())
    }

    pub struct MetadataHandler {
        engine: MetadataQueryEngine,
    }

    impl MetadataHandler {
        pub fn new(engine: MetadataQueryEngine) -> Self {
            Self { engine }
        }
    }

    fn string_property(description: &str) -> Map<String, Value> {
        let mut prop = Map::new();
        prop.insert("type".into(), Value::String("string".into()));
        prop.insert("description".into(), Value::String(description.into()));
        prop
    }

    #[async_trait::async_trait]
    impl rust_mcp_sdk::mcp_server::ServerHandler for MetadataHandler {
        async fn handle_list_tools_request(
            &self,
            _request: rust_mcp_schema::ListToolsRequest,
            runtime: &dyn rust_mcp_sdk::MCPServer,
        ) -> std::result::Result<rust_mcp_schema::ListToolsResult, rust_mcp_schema::RpcError>
        {
            runtime.assert_server_request_capabilities(&"tools/list".to_string())?;

            use rust_mcp_schema::{ListToolsResult, Tool, ToolInputSchema};
            use std::collections::HashMap;
            let tools = crate::server::list_tools()
                .into_iter()
                .map(|t| {
                    let mut required: Vec<String> = Vec::new();
                    let mut props: HashMap<String, Map<String, Value>> = HashMap::new();
                    match t.name {
                        "metadata_query" => {
                            required.push("statement".into());
                            props.insert(
                                "statement".into(),
                                string_property("SHOW TABLES LIKE <pattern> or DESCRIBE TABLES LIKE <pattern> [COLUMNS LIKE <pattern>]"),
                            );
                        }
                        "show_tables" => {
                            required.push("pattern".into());
                            props.insert("pattern".into(), string_property("SQL LIKE pattern for table names"));
                        }
                        "describe_tables" => {
                            required.push("table_pattern".into());
                            props.insert(
                                "table_pattern".into(),
                                string_property("SQL LIKE pattern for table names"),
                            );
                            props.insert(
                                "column_pattern".into(),
                                string_property("Optional SQL LIKE pattern for column names"),
                            );
                        }
                        _ => {}
                    }
                    Tool {
                        description: Some(t.description.to_string()),
                        input_schema: ToolInputSchema::new(required, Some(props)),
                        name: t.name.to_string(),
                    }
                })
                .collect();

            Ok(ListToolsResult {
                tools,
                meta: None,
                next_cursor: None,
            })
        }

        async fn handle_call_tool_request(
            &self,
            request: rust_mcp_schema::CallToolRequest,
            runtime: &dyn rust_mcp_sdk::MCPServer,
        ) -> std::result::Result<
            rust_mcp_schema::CallToolResult,
            rust_mcp_schema::schema_utils::CallToolError,
        > {
            runtime
                .assert_server_request_capabilities(&"tools/call".to_string())
                .map_err(rust_mcp_schema::schema_utils::CallToolError::new)?;

            let name = request.params.name;
            let call = match parse_tool_call(&name, request.params.arguments.as_ref()) {
                Ok(call) => call,
                Err(msg) => {
                    warn!(tool = %name, error = %msg, "rejected tool arguments");
                    return Ok(rust_mcp_schema::CallToolResult::text_content(
                        argument_error_json(&msg),
                        None,
                    ));
                }
            };
            let span = tracing::info_span!("tool", name = %name);
            let result = async {
                match call {
                    ToolRequest::Statement(sql) => self.engine.execute(&sql).await,
                    ToolRequest::Intent(intent) => self.engine.execute_intent(intent).await,
                }
            }
            .instrument(span)
            .await;
            let json = match result {
                Ok(envelope) => serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".into()),
                Err(err) => {
                    warn!(tool = %name, error = %err, "metadata query failed");
                    serde_json::to_string(&ErrorEnvelope::from(&err)).unwrap_or_else(|_| "{}".into())
                }
            };
            Ok(rust_mcp_schema::CallToolResult::text_content(json, None))
        }
    }
}

#[cfg(feature = "mcp")]
pub mod db {
    use crate::catalog::{CatalogSource, CollectionDescriptor, FieldDescriptor, Nullability};
    use crate::error::{MetadataError, MetadataResult};
    use crate::types::{JdbcType, cql_decimal_digits};
    use anyhow::{Context, Result};
    use scylla::{Session, SessionBuilder};
    use std::env;
    use tracing::info;

    #[derive(Debug, Clone)]
    pub struct ScyllaConfig {
        pub uri: String,
        pub user: Option<String>,
        pub password: Option<String>,
        pub ssl: bool,
        pub ca_bundle: Option<String>,
        pub ssl_insecure: bool,
        pub keyspace: String,
    }

    impl ScyllaConfig {
        pub fn from_env() -> Result<Self> {
            let flag = |key: &str| {
                env::var(key)
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false)
            };
            Ok(ScyllaConfig {
                uri: env::var("SCYLLA_URI").unwrap_or_else(|_| "127.0.0.1:9042".to_string()),
                user: env::var("SCYLLA_USER").ok(),
                password: env::var("SCYLLA_PASS").ok(),
                ssl: flag("SCYLLA_SSL"),
                ca_bundle: env::var("SCYLLA_CA_BUNDLE").ok(),
                ssl_insecure: flag("SCYLLA_SSL_INSECURE"),
                keyspace: env::var("SCYLLA_KEYSPACE")
                    .context("SCYLLA_KEYSPACE must name the keyspace to expose")?,
            })
        }
    }

    pub async fn connect(config: &ScyllaConfig) -> Result<Session> {
        info!(uri = %config.uri, keyspace = %config.keyspace, "connecting to scylla");
        let mut sb = SessionBuilder::new().known_node(&config.uri);
        if let (Some(user), Some(pass)) = (&config.user, &config.password) {
            sb = sb.user(user, pass);
        }
        if config.ssl {
            use openssl::ssl::{SslContext, SslMethod, SslVerifyMode};
            let mut ctx = SslContext::builder(SslMethod::tls()).context("ssl context")?;
            if let Some(ca_file) = &config.ca_bundle {
                ctx.set_ca_file(ca_file)
                    .with_context(|| format!("failed to load CA bundle {}", ca_file))?;
            }
            ctx.set_verify(if config.ssl_insecure {
                SslVerifyMode::NONE
            } else {
                SslVerifyMode::PEER
            });
            sb = sb.ssl_context(Some(ctx.build()));
        }
        sb.build().await.context("failed to connect to SCYLLA_URI")
    }

    /// `CatalogSource` over one keyspace's `system_schema` tables.
    pub struct ScyllaCatalog {
        session: Session,
        keyspace: String,
    }

    impl ScyllaCatalog {
        pub fn new(session: Session, keyspace: impl Into<String>) -> Self {
            Self {
                session,
                keyspace: keyspace.into(),
            }
        }

        pub fn keyspace(&self) -> &str {
            &self.keyspace
        }

        async fn tables(&self) -> Result<Vec<CollectionDescriptor>> {
            let result = self
                .session
                .query_unpaged(
                    "SELECT table_name, comment FROM system_schema.tables WHERE keyspace_name = ?",
                    (self.keyspace.clone(),),
                )
                .await?;
            let mut tables = Vec::new();
            for row in result.rows_typed::<(String, Option<String>)>()? {
                let (name, comment) = row?;
                let mut collection = CollectionDescriptor::new(name).with_schema(self.keyspace.as_str());
                if let Some(comment) = comment.filter(|c| !c.is_empty()) {
                    collection = collection.with_remarks(comment);
                }
                tables.push(collection);
            }
            Ok(tables)
        }

        async fn columns(&self, table: &str) -> Result<Vec<FieldDescriptor>> {
            let result = self
                .session
                .query_unpaged(
                    "SELECT column_name, kind, position, type FROM system_schema.columns WHERE keyspace_name = ? AND table_name = ?",
                    (self.keyspace.clone(), table.to_string()),
                )
                .await?;
            let mut columns: Vec<(String, String, i32, String)> = Vec::new();
            for row in result.rows_typed::<(String, String, i32, String)>()? {
                columns.push(row?);
            }
            // key columns first, in key order; regular columns by name
            columns.sort_by(|a, b| {
                kind_rank(&a.1)
                    .cmp(&kind_rank(&b.1))
                    .then(a.2.cmp(&b.2))
                    .then_with(|| a.0.cmp(&b.0))
            });
            Ok(columns
                .into_iter()
                .enumerate()
                .map(|(i, (name, kind, _, ty))| {
                    let nullable = if kind == "partition_key" || kind == "clustering" {
                        Nullability::NoNulls
                    } else {
                        Nullability::Nullable
                    };
                    let digits = cql_decimal_digits(&ty);
                    FieldDescriptor::new(name, JdbcType::from_cql(&ty), ty, i as i32 + 1)
                        .with_nullability(nullable)
                        .with_decimal_digits(digits)
                })
                .collect())
        }

        async fn local_cluster_name(&self) -> Result<String> {
            let result = self
                .session
                .query_unpaged("SELECT cluster_name FROM system.local", &[])
                .await?;
            let mut rows = result.rows_typed::<(String,)>()?;
            match rows.next() {
                Some(row) => Ok(row?.0),
                None => anyhow::bail!("system.local returned no rows"),
            }
        }
    }

    fn kind_rank(kind: &str) -> u8 {
        match kind {
            "partition_key" => 0,
            "clustering" => 1,
            "static" => 2,
            _ => 3,
        }
    }

    #[async_trait::async_trait]
    impl CatalogSource for ScyllaCatalog {
        async fn list_collections(
            &self,
            _name_pattern: Option<&str>,
        ) -> MetadataResult<Vec<CollectionDescriptor>> {
            self.tables()
                .await
                .map_err(|e| MetadataError::lookup("list_collections", e))
        }

        async fn list_fields(&self, collection: &str) -> MetadataResult<Vec<FieldDescriptor>> {
            self.columns(collection)
                .await
                .map_err(|e| MetadataError::lookup("list_fields", e))
        }

        async fn cluster_name(&self) -> MetadataResult<String> {
            self.local_cluster_name()
                .await
                .map_err(|e| MetadataError::lookup("cluster_name", e))
        }

        // system_schema rows come back in token order
        fn preserves_order(&self) -> bool {
            false
        }
    }
}
