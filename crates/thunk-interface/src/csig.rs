//! Hand-written C declaration parser.
//!
//! Handles the declarations that appear in thunked library interfaces:
//! stdint and builtin types, const qualifiers, named records and enums,
//! pointers, fixed-size arrays, function pointers and variadic functions.
//! Declarators are parsed with the usual inside-out C rules, so
//! `int (*cb)(char, char)` yields a pointer to a function type.

use crate::error::{InterfaceError, Result};

/// A C type representation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CType {
    Void,
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
    LongDouble,
    // stdint types
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    SizeT,
    SSizeT,
    IntPtr,
    UIntPtr,
    /// Pointer to another type.
    Pointer(Box<CType>),
    /// Const-qualified type.
    Const(Box<CType>),
    /// Record, enum or typedef reference (by name).
    Named(String),
    /// Fixed-size array.
    Array(Box<CType>, u64),
    /// Function type. Only ever appears behind a pointer or as a callback
    /// signature.
    Function(Box<FunctionType>),
}

/// A C function type (return type plus parameter types).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionType {
    pub return_type: CType,
    pub params: Vec<CType>,
    pub is_variadic: bool,
}

impl CType {
    /// Whether this type is void.
    pub fn is_void(&self) -> bool {
        matches!(self.strip_const(), CType::Void)
    }

    /// Strip const qualifiers from outer level.
    pub fn strip_const(&self) -> &CType {
        match self {
            CType::Const(inner) => inner.strip_const(),
            other => other,
        }
    }

    /// Whether the outer level (ignoring const) is a pointer.
    pub fn is_pointer(&self) -> bool {
        matches!(self.strip_const(), CType::Pointer(_))
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self) -> Option<&CType> {
        match self.strip_const() {
            CType::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// The function type behind a function pointer, if this is one.
    pub fn as_function_pointer(&self) -> Option<&FunctionType> {
        match self.pointee()?.strip_const() {
            CType::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Whether this is a pointer to a function.
    pub fn is_function_pointer(&self) -> bool {
        self.as_function_pointer().is_some()
    }

    /// Whether this is a builtin arithmetic type.
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self.strip_const(),
            CType::Void
                | CType::Pointer(_)
                | CType::Named(_)
                | CType::Array(..)
                | CType::Function(_)
                | CType::Const(_)
        )
    }

    /// Whether the outermost pointee of this pointer is const-qualified.
    pub fn is_pointer_to_const(&self) -> bool {
        matches!(self.pointee(), Some(CType::Const(_)))
    }

    /// Peel all pointer, const and array layers.
    pub fn innermost(&self) -> &CType {
        match self {
            CType::Pointer(inner) | CType::Const(inner) | CType::Array(inner, _) => {
                inner.innermost()
            }
            other => other,
        }
    }
}

impl std::fmt::Display for CType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CType::Void => write!(f, "void"),
            CType::Bool => write!(f, "_Bool"),
            CType::Char => write!(f, "char"),
            CType::SignedChar => write!(f, "signed char"),
            CType::UnsignedChar => write!(f, "unsigned char"),
            CType::Short => write!(f, "short"),
            CType::UnsignedShort => write!(f, "unsigned short"),
            CType::Int => write!(f, "int"),
            CType::UnsignedInt => write!(f, "unsigned int"),
            CType::Long => write!(f, "long"),
            CType::UnsignedLong => write!(f, "unsigned long"),
            CType::LongLong => write!(f, "long long"),
            CType::UnsignedLongLong => write!(f, "unsigned long long"),
            CType::Float => write!(f, "float"),
            CType::Double => write!(f, "double"),
            CType::LongDouble => write!(f, "long double"),
            CType::Int8 => write!(f, "int8_t"),
            CType::Int16 => write!(f, "int16_t"),
            CType::Int32 => write!(f, "int32_t"),
            CType::Int64 => write!(f, "int64_t"),
            CType::UInt8 => write!(f, "uint8_t"),
            CType::UInt16 => write!(f, "uint16_t"),
            CType::UInt32 => write!(f, "uint32_t"),
            CType::UInt64 => write!(f, "uint64_t"),
            CType::SizeT => write!(f, "size_t"),
            CType::SSizeT => write!(f, "ssize_t"),
            CType::IntPtr => write!(f, "intptr_t"),
            CType::UIntPtr => write!(f, "uintptr_t"),
            CType::Pointer(inner) => {
                // Function pointers are spelled `R (*)(A, B)`
                let mut depth = 1;
                let mut pointee = inner.as_ref();
                while let CType::Pointer(next) = pointee {
                    depth += 1;
                    pointee = next;
                }
                if let CType::Function(func) = pointee {
                    write!(
                        f,
                        "{} ({}){}",
                        func.return_type,
                        "*".repeat(depth),
                        ParamList(&func.params, func.is_variadic)
                    )
                } else {
                    write!(f, "{inner}*")
                }
            }
            // Qualified pointers keep the qualifier after the `*`
            CType::Const(inner) if matches!(inner.as_ref(), CType::Pointer(_)) => write!(f, "{inner} const"),
            CType::Const(inner) => write!(f, "const {inner}"),
            CType::Named(name) => write!(f, "{name}"),
            CType::Array(inner, len) => write!(f, "{inner}[{len}]"),
            CType::Function(func) => write!(
                f,
                "{} {}",
                func.return_type,
                ParamList(&func.params, func.is_variadic)
            ),
        }
    }
}

/// Parenthesized parameter type list, e.g. `(char, char)` or `(int, ...)`.
struct ParamList<'a>(&'a [CType], bool);

impl std::fmt::Display for ParamList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        if self.1 {
            if !self.0.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}

/// A parsed C function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CParam {
    /// Parameter type.
    pub param_type: CType,
    /// Parameter name (may be empty if unnamed).
    pub name: String,
}

/// A parsed C function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSignature {
    /// Return type.
    pub return_type: CType,
    /// Function name.
    pub name: String,
    /// Parameters (excluding variadic `...`).
    pub parameters: Vec<CParam>,
    /// Whether the function is variadic (`...`).
    pub is_variadic: bool,
}

impl CSignature {
    /// Parse a C function signature string.
    ///
    /// Examples:
    /// - `"double sin(double x)"`
    /// - `"void qsort(void* base, size_t n, size_t size, int (*cmp)(const void*, const void*))"`
    /// - `"int printf(const char* fmt, ...)"`
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser::new(input)?;
        let base = parser.parse_base_type()?;
        let declarator = parser.parse_declarator()?;
        parser.expect_end()?;

        let name = declarator.name().map(str::to_string).ok_or_else(|| {
            invalid(input, "missing function name")
        })?;
        // The last constructor applied to the name must be the parameter list
        let Some(Ctor::Suffix(Suffix::Function(params, is_variadic))) = declarator.outer_ctor()
        else {
            return Err(invalid(input, "not a function declaration"));
        };
        let (params, is_variadic) = (params.clone(), *is_variadic);
        let CType::Function(func) = declarator.apply(base) else {
            return Err(invalid(input, "not a function declaration"));
        };
        if matches!(func.return_type, CType::Function(_) | CType::Array(..)) {
            return Err(invalid(input, "functions cannot return arrays or functions"));
        }

        Ok(CSignature {
            return_type: unqualified_object(func.return_type),
            name,
            parameters: params,
            is_variadic,
        })
    }

    /// The function type described by this signature.
    pub fn function_type(&self) -> FunctionType {
        FunctionType {
            return_type: self.return_type.clone(),
            params: self.parameters.iter().map(|p| p.param_type.clone()).collect(),
            is_variadic: self.is_variadic,
        }
    }

    /// Normalized signature text: canonical spelling, parameter names dropped.
    pub fn normalized(&self) -> String {
        let params: Vec<CType> = self.parameters.iter().map(|p| p.param_type.clone()).collect();
        format!(
            "{} {}{}",
            self.return_type,
            self.name,
            ParamList(&params, self.is_variadic)
        )
    }
}

impl std::fmt::Display for CSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param.param_type)?;
            if !param.name.is_empty() {
                write!(f, " {}", param.name)?;
            }
        }
        if self.is_variadic {
            if !self.parameters.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}

/// Parse a C declaration with an optional declarator name, e.g. a record
/// member (`"char name[16]"`, `"struct B* next"`) or a bare type (`"int"`).
pub fn parse_declaration(input: &str) -> Result<(CType, Option<String>)> {
    let mut parser = Parser::new(input)?;
    let base = parser.parse_base_type()?;
    let declarator = parser.parse_declarator()?;
    parser.expect_end()?;
    let name = declarator.name().map(str::to_string);
    Ok((unqualified_object(declarator.apply(base)), name))
}

/// Drop a qualifier on the declared pointer itself (`char* const p`). It
/// changes neither the layout nor the function type; qualifiers on
/// pointees are kept.
fn unqualified_object(ty: CType) -> CType {
    match ty {
        CType::Const(inner) if matches!(inner.as_ref(), CType::Pointer(_)) => *inner,
        other => other,
    }
}

/// Parse an abstract C type (no declarator name), e.g. `"int (char, char)"`.
pub fn parse_type(input: &str) -> Result<CType> {
    match parse_declaration(input)? {
        (ty, None) => Ok(ty),
        (_, Some(name)) => Err(invalid(input, &format!("unexpected declarator name '{name}'"))),
    }
}

fn invalid(input: &str, detail: &str) -> InterfaceError {
    InterfaceError::InvalidDeclaration {
        input: input.to_string(),
        detail: detail.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(u64),
    Star,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Ellipsis,
}

/// Tokenize a C declaration fragment.
fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                if input[start..].starts_with("...") {
                    chars.nth(2);
                    tokens.push(Token::Ellipsis);
                } else {
                    return Err(invalid(input, "unexpected '.'"));
                }
            }
            c if c.is_ascii_digit() => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if !d.is_ascii_alphanumeric() {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                let digits = input[start..end].trim_end_matches(['u', 'U', 'l', 'L']);
                let value = digits
                    .parse()
                    .map_err(|_| invalid(input, &format!("invalid number '{}'", &input[start..end])))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if !(d.is_ascii_alphanumeric() || d == '_') {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Ident(input[start..end].to_string()));
            }
            other => {
                return Err(invalid(input, &format!("unexpected character '{other}'")));
            }
        }
    }
    Ok(tokens)
}

/// Declarator suffix: `[N]` or `(params)`.
#[derive(Debug, Clone)]
enum Suffix {
    Array(u64),
    Function(Vec<CParam>, bool),
}

/// Outermost type constructor of a declarator.
enum Ctor<'a> {
    Pointer,
    Suffix(&'a Suffix),
}

/// A parsed declarator, applied inside-out to a base type.
#[derive(Debug, Default)]
struct Declarator {
    name: Option<String>,
    /// One entry per `*`, innermost first: whether that pointer is const.
    pointers: Vec<bool>,
    inner: Option<Box<Declarator>>,
    suffixes: Vec<Suffix>,
}

impl Declarator {
    fn name(&self) -> Option<&str> {
        match &self.inner {
            Some(inner) => inner.name(),
            None => self.name.as_deref(),
        }
    }

    /// The type constructor applied last, i.e. the one that binds tightest
    /// to the declared name.
    fn outer_ctor(&self) -> Option<Ctor<'_>> {
        if let Some(ctor) = self.inner.as_ref().and_then(|inner| inner.outer_ctor()) {
            return Some(ctor);
        }
        if let Some(suffix) = self.suffixes.first() {
            return Some(Ctor::Suffix(suffix));
        }
        (!self.pointers.is_empty()).then_some(Ctor::Pointer)
    }

    fn apply(self, base: CType) -> CType {
        let mut ty = base;
        for is_const in self.pointers {
            ty = CType::Pointer(Box::new(ty));
            if is_const {
                ty = CType::Const(Box::new(ty));
            }
        }
        for suffix in self.suffixes.into_iter().rev() {
            ty = match suffix {
                Suffix::Array(len) => CType::Array(Box::new(ty), len),
                Suffix::Function(params, is_variadic) => CType::Function(Box::new(FunctionType {
                    return_type: ty,
                    params: params.into_iter().map(|p| p.param_type).collect(),
                    is_variadic,
                })),
            };
        }
        match self.inner {
            Some(inner) => inner.apply(ty),
            None => ty,
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(invalid(input, "empty declaration"));
        }
        Ok(Self { input, tokens, pos: 0 })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_ident(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Ident(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(self.error(&format!("unexpected trailing token {tok:?}"))),
        }
    }

    fn error(&self, detail: &str) -> InterfaceError {
        invalid(self.input, detail)
    }

    fn eat_qualifiers(&mut self) -> bool {
        let mut is_const = false;
        while let Some(word) = self.peek_ident() {
            match word {
                "const" => is_const = true,
                "volatile" | "restrict" | "__restrict" => {}
                _ => break,
            }
            self.pos += 1;
        }
        is_const
    }

    /// Parse a type specifier (with qualifiers) from the token stream.
    fn parse_base_type(&mut self) -> Result<CType> {
        let mut is_const = self.eat_qualifiers();

        let Some(word) = self.peek_ident().map(str::to_string) else {
            return Err(self.error("expected type"));
        };
        self.pos += 1;

        let ct = match word.as_str() {
            "struct" | "enum" => match self.advance() {
                Some(Token::Ident(name)) => CType::Named(name),
                _ => return Err(self.error(&format!("expected {word} name"))),
            },
            "union" => return Err(self.error("unions are not supported")),
            "unsigned" | "signed" => {
                let is_unsigned = word == "unsigned";
                match self.peek_ident() {
                    Some("char") => {
                        self.pos += 1;
                        if is_unsigned { CType::UnsignedChar } else { CType::SignedChar }
                    }
                    Some("short") => {
                        self.pos += 1;
                        self.eat_word("int");
                        if is_unsigned { CType::UnsignedShort } else { CType::Short }
                    }
                    Some("int") => {
                        self.pos += 1;
                        if is_unsigned { CType::UnsignedInt } else { CType::Int }
                    }
                    Some("long") => {
                        self.pos += 1;
                        let is_long_long = self.eat_word("long");
                        self.eat_word("int");
                        match (is_unsigned, is_long_long) {
                            (true, true) => CType::UnsignedLongLong,
                            (false, true) => CType::LongLong,
                            (true, false) => CType::UnsignedLong,
                            (false, false) => CType::Long,
                        }
                    }
                    // bare `unsigned` / `signed` means `unsigned int` / `int`
                    _ => {
                        if is_unsigned { CType::UnsignedInt } else { CType::Int }
                    }
                }
            }
            "void" => CType::Void,
            "char" => CType::Char,
            "short" => {
                self.eat_word("int");
                CType::Short
            }
            "int" => CType::Int,
            "long" => {
                if self.eat_word("long") {
                    self.eat_word("int");
                    CType::LongLong
                } else if self.eat_word("double") {
                    CType::LongDouble
                } else {
                    self.eat_word("int");
                    CType::Long
                }
            }
            "float" => CType::Float,
            "double" => CType::Double,
            "_Bool" | "bool" => CType::Bool,
            "size_t" => CType::SizeT,
            "ssize_t" => CType::SSizeT,
            "intptr_t" => CType::IntPtr,
            "uintptr_t" => CType::UIntPtr,
            "int8_t" => CType::Int8,
            "int16_t" => CType::Int16,
            "int32_t" => CType::Int32,
            "int64_t" => CType::Int64,
            "uint8_t" => CType::UInt8,
            "uint16_t" => CType::UInt16,
            "uint32_t" => CType::UInt32,
            "uint64_t" => CType::UInt64,
            "const" | "volatile" | "restrict" => {
                return Err(self.error("duplicate qualifier"));
            }
            // Any other identifier names a record, enum or typedef
            other => CType::Named(other.to_string()),
        };

        // Trailing qualifiers: `char const*`
        is_const |= self.eat_qualifiers();
        Ok(if is_const { CType::Const(Box::new(ct)) } else { ct })
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.peek_ident() == Some(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_declarator(&mut self) -> Result<Declarator> {
        let mut declarator = Declarator::default();
        while self.eat(&Token::Star) {
            let is_const = self.eat_qualifiers();
            declarator.pointers.push(is_const);
        }

        match self.peek() {
            Some(Token::Ident(_)) => {
                if let Some(Token::Ident(name)) = self.advance() {
                    declarator.name = Some(name);
                }
            }
            Some(Token::LParen) if self.is_nested_declarator() => {
                self.pos += 1;
                let inner = self.parse_declarator()?;
                self.expect(&Token::RParen, "')' after nested declarator")?;
                declarator.inner = Some(Box::new(inner));
            }
            _ => {}
        }

        loop {
            if self.eat(&Token::LBracket) {
                let len = match self.advance() {
                    Some(Token::Number(n)) => n,
                    _ => return Err(self.error("expected array length")),
                };
                self.expect(&Token::RBracket, "']'")?;
                declarator.suffixes.push(Suffix::Array(len));
            } else if self.peek() == Some(&Token::LParen) {
                self.pos += 1;
                let (params, is_variadic) = self.parse_params()?;
                declarator.suffixes.push(Suffix::Function(params, is_variadic));
            } else {
                break;
            }
        }

        Ok(declarator)
    }

    /// After a `(` in declarator position: a nested declarator starts with
    /// `*` or another `(`; anything else is a parameter list.
    fn is_nested_declarator(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1),
            Some(Token::Star) | Some(Token::LParen)
        )
    }

    /// Parse the parameter list after `(`, consuming the closing `)`.
    fn parse_params(&mut self) -> Result<(Vec<CParam>, bool)> {
        let mut params = Vec::new();
        let mut is_variadic = false;

        if self.eat(&Token::RParen) {
            return Ok((params, false));
        }
        // `(void)`
        if self.peek_ident() == Some("void") && self.tokens.get(self.pos + 1) == Some(&Token::RParen) {
            self.pos += 2;
            return Ok((params, false));
        }

        loop {
            if self.eat(&Token::Ellipsis) {
                is_variadic = true;
                self.expect(&Token::RParen, "')' after '...'")?;
                break;
            }
            let base = self.parse_base_type()?;
            let declarator = self.parse_declarator()?;
            let name = declarator.name().unwrap_or_default().to_string();
            let param_type = match unqualified_object(declarator.apply(base)) {
                // Array and function parameters decay to pointers
                CType::Array(elem, _) => CType::Pointer(elem),
                func @ CType::Function(_) => CType::Pointer(Box::new(func)),
                other => other,
            };
            if param_type.is_void() {
                return Err(self.error("'void' must be the only parameter"));
            }
            params.push(CParam { param_type, name });

            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RParen, "',' or ')' in parameter list")?;
            break;
        }

        Ok((params, is_variadic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptr(inner: CType) -> CType {
        CType::Pointer(Box::new(inner))
    }

    #[test]
    fn parse_simple_function() {
        let sig = CSignature::parse("double sin(double x)").unwrap();
        assert_eq!(sig.name, "sin");
        assert_eq!(sig.return_type, CType::Double);
        assert_eq!(sig.parameters.len(), 1);
        assert_eq!(sig.parameters[0].param_type, CType::Double);
        assert_eq!(sig.parameters[0].name, "x");
        assert!(!sig.is_variadic);
    }

    #[test]
    fn parse_pointer_return() {
        let sig = CSignature::parse("void* malloc(size_t size)").unwrap();
        assert_eq!(sig.name, "malloc");
        assert_eq!(sig.return_type, ptr(CType::Void));
        assert_eq!(sig.parameters[0].param_type, CType::SizeT);
    }

    #[test]
    fn parse_const_char_pointer() {
        let sig = CSignature::parse("int puts(const char* s)").unwrap();
        assert_eq!(
            sig.parameters[0].param_type,
            ptr(CType::Const(Box::new(CType::Char)))
        );
        assert!(sig.parameters[0].param_type.is_pointer_to_const());
    }

    #[test]
    fn parse_variadic() {
        let sig = CSignature::parse("int printf(const char* fmt, ...)").unwrap();
        assert!(sig.is_variadic);
        assert_eq!(sig.parameters.len(), 1);
        assert_eq!(sig.to_string(), "int printf(const char* fmt, ...)");
    }

    #[test]
    fn parse_void_params() {
        let sig = CSignature::parse("int getpid(void)").unwrap();
        assert!(sig.parameters.is_empty());
        let sig = CSignature::parse("void func()").unwrap();
        assert!(sig.parameters.is_empty());
        assert_eq!(sig.return_type, CType::Void);
    }

    #[test]
    fn parse_function_pointer_parameter() {
        let sig = CSignature::parse("void func(int (*funcptr)(char, char))").unwrap();
        assert_eq!(sig.parameters[0].name, "funcptr");
        let fp = sig.parameters[0].param_type.as_function_pointer().unwrap();
        assert_eq!(fp.return_type, CType::Int);
        assert_eq!(fp.params, vec![CType::Char, CType::Char]);
        assert_eq!(sig.parameters[0].param_type.to_string(), "int (*)(char, char)");
    }

    #[test]
    fn parse_function_returning_function_pointer() {
        let sig = CSignature::parse("void (*get_handler(int id))(char, char)").unwrap();
        assert_eq!(sig.name, "get_handler");
        assert_eq!(sig.parameters[0].param_type, CType::Int);
        assert!(sig.return_type.is_function_pointer());
        assert_eq!(sig.return_type.to_string(), "void (*)(char, char)");
    }

    #[test]
    fn parse_named_types() {
        let sig = CSignature::parse("void func(int arg, char, unsigned long, TestStruct)").unwrap();
        assert_eq!(sig.parameters.len(), 4);
        assert_eq!(sig.parameters[2].param_type, CType::UnsignedLong);
        assert_eq!(sig.parameters[3].param_type, CType::Named("TestStruct".into()));

        let sig = CSignature::parse("void func(struct A* a)").unwrap();
        assert_eq!(sig.parameters[0].param_type, ptr(CType::Named("A".into())));
    }

    #[test]
    fn parse_record_members() {
        let (ty, name) = parse_declaration("char name[16]").unwrap();
        assert_eq!(name.as_deref(), Some("name"));
        assert_eq!(ty, CType::Array(Box::new(CType::Char), 16));

        let (ty, name) = parse_declaration("struct B* next").unwrap();
        assert_eq!(name.as_deref(), Some("next"));
        assert_eq!(ty, ptr(CType::Named("B".into())));

        let (ty, _) = parse_declaration("void (*on_event)(void* user, int code)").unwrap();
        assert!(ty.is_function_pointer());
    }

    #[test]
    fn parse_abstract_function_type() {
        let ty = parse_type("int (char, char)").unwrap();
        match ty {
            CType::Function(f) => assert_eq!(f.params.len(), 2),
            other => panic!("expected function type, got {other:?}"),
        }
        assert!(parse_type("int x").is_err());
    }

    #[test]
    fn pointer_qualifiers_keep_their_position() {
        let inner_const = CSignature::parse("void f(char* const* argv)").unwrap();
        let pointee_const = CSignature::parse("void f(const char** argv)").unwrap();
        let plain = CSignature::parse("void f(char** argv)").unwrap();
        assert_eq!(
            inner_const.parameters[0].param_type,
            ptr(CType::Const(Box::new(ptr(CType::Char))))
        );
        assert_eq!(inner_const.normalized(), "void f(char* const*)");
        assert_eq!(pointee_const.normalized(), "void f(const char**)");
        assert_ne!(inner_const.normalized(), plain.normalized());

        let both = CSignature::parse("void f(const char* const* argv)").unwrap();
        assert_eq!(both.normalized(), "void f(const char* const*)");
    }

    #[test]
    fn qualified_object_pointer_is_unqualified() {
        let sig = CSignature::parse("char* const name(char* const p)").unwrap();
        assert_eq!(sig.return_type, ptr(CType::Char));
        assert_eq!(sig.parameters[0].param_type, ptr(CType::Char));
        assert_eq!(sig.normalized(), "char* name(char*)");

        let (ty, _) = parse_declaration("int (* const cb)(int)").unwrap();
        assert!(ty.is_function_pointer());
    }

    #[test]
    fn normalized_drops_names() {
        let sig = CSignature::parse("int  add( int a,int   b )").unwrap();
        assert_eq!(sig.normalized(), "int add(int, int)");
    }

    #[test]
    fn parse_invalid() {
        assert!(CSignature::parse("").is_err());
        assert!(CSignature::parse("double sin double x").is_err());
        assert!(CSignature::parse("int x").is_err());
        assert!(CSignature::parse("void f(int, ..., int)").is_err());
        assert!(CSignature::parse("void f(union U u)").is_err());
    }
}
