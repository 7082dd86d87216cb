// SQL tokens for lexical analysis

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals and names
    /// Unquoted identifiers are folded to lower case
    Identifier(String),
    Number(String),
    String(String),
    /// `?`
    Parameter,

    // Reserved words
    Select,
    From,
    Where,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Create,
    Table,
    Drop,
    Alter,
    Index,
    On,
    Primary,
    Foreign,
    References,
    Constraint,
    Default,
    And,
    Or,
    Not,
    Null,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    Join,
    Inner,
    Left,
    Right,
    Outer,
    Cross,
    As,
    Distinct,
    All,
    Any,
    Some,
    Group,
    Having,
    Union,
    Intersect,
    Except,
    With,
    In,
    Exists,
    Between,
    Like,
    Is,
    True,
    False,
    Case,
    When,
    Then,
    Else,
    End,
    Cast,
    Unique,
    Check,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Concat,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Dot,

    Eof,
}

impl Token {
    /// Reserved word for `s`, compared case-insensitively. Words that only
    /// have a meaning in one clause (KEY, CASCADE, RECURSIVE, type names)
    /// stay identifiers and are matched by the parser in context.
    pub fn keyword_from_str(s: &str) -> Option<Token> {
        let token = match s.to_ascii_uppercase().as_str() {
            "SELECT" => Token::Select,
            "FROM" => Token::From,
            "WHERE" => Token::Where,
            "INSERT" => Token::Insert,
            "INTO" => Token::Into,
            "VALUES" => Token::Values,
            "UPDATE" => Token::Update,
            "SET" => Token::Set,
            "DELETE" => Token::Delete,
            "CREATE" => Token::Create,
            "TABLE" => Token::Table,
            "DROP" => Token::Drop,
            "ALTER" => Token::Alter,
            "INDEX" => Token::Index,
            "ON" => Token::On,
            "PRIMARY" => Token::Primary,
            "FOREIGN" => Token::Foreign,
            "REFERENCES" => Token::References,
            "CONSTRAINT" => Token::Constraint,
            "DEFAULT" => Token::Default,
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "NULL" => Token::Null,
            "ORDER" => Token::Order,
            "BY" => Token::By,
            "ASC" => Token::Asc,
            "DESC" => Token::Desc,
            "LIMIT" => Token::Limit,
            "OFFSET" => Token::Offset,
            "JOIN" => Token::Join,
            "INNER" => Token::Inner,
            "LEFT" => Token::Left,
            "RIGHT" => Token::Right,
            "OUTER" => Token::Outer,
            "CROSS" => Token::Cross,
            "AS" => Token::As,
            "DISTINCT" => Token::Distinct,
            "ALL" => Token::All,
            "ANY" => Token::Any,
            "SOME" => Token::Some,
            "GROUP" => Token::Group,
            "HAVING" => Token::Having,
            "UNION" => Token::Union,
            "INTERSECT" => Token::Intersect,
            "EXCEPT" => Token::Except,
            "WITH" => Token::With,
            "IN" => Token::In,
            "EXISTS" => Token::Exists,
            "BETWEEN" => Token::Between,
            "LIKE" => Token::Like,
            "IS" => Token::Is,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            "CASE" => Token::Case,
            "WHEN" => Token::When,
            "THEN" => Token::Then,
            "ELSE" => Token::Else,
            "END" => Token::End,
            "CAST" => Token::Cast,
            "UNIQUE" => Token::Unique,
            "CHECK" => Token::Check,
            _ => return None,
        };
        Some(token)
    }

    /// Whether the token can start a FROM-clause alias without AS
    pub fn is_identifier(&self) -> bool {
        matches!(self, Token::Identifier(_))
    }
}

/// A token with the byte range of its source text
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}
