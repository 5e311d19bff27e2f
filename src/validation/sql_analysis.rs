// Parse-tree helpers shared by the validator, enhancer, executor and
// orchestrator. All identifier extraction goes through the sqlparser AST or
// token stream, never through free-form text scanning, so names inside string
// literals or comments are never mistaken for tables.

use sqlparser::ast::{
    visit_expressions, Expr, ObjectName, ObjectNamePart, Query, Select, SetExpr, Statement,
    TableFactor, TableWithJoins, Visit, Visitor,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Token, Tokenizer, TokenizerError};
use std::ops::ControlFlow;

/// A table referenced in a FROM or JOIN clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Unqualified, unquoted table name
    pub name: String,
    /// Everything in front of the table name (`cctns` in `cctns.FIR`)
    pub schema: Option<String>,
    pub alias: Option<String>,
}

impl TableRef {
    /// Name the table is addressed by inside the statement
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Name as written, schema qualifier included
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

/// Structural facts about one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementAnalysis {
    /// Catalog-facing table references, CTE names excluded
    pub tables: Vec<TableRef>,
    /// Relations that are not plain tables (table functions, UNNEST, ...)
    pub unsupported_relations: Vec<String>,
    pub cte_names: Vec<String>,
    /// Explicit JOINs plus implicit comma joins
    pub join_count: usize,
    /// Every SELECT block, the outermost one included
    pub select_count: usize,
}

impl StatementAnalysis {
    pub fn subquery_count(&self) -> usize {
        self.select_count.saturating_sub(1)
    }

    /// Distinct table names in first-seen order
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for table in &self.tables {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&table.name)) {
                names.push(table.name.clone());
            }
        }
        names
    }
}

pub fn dialect() -> GenericDialect {
    GenericDialect {}
}

pub fn parse_statements(sql: &str) -> Result<Vec<Statement>, ParserError> {
    Parser::parse_sql(&dialect(), sql)
}

pub fn tokenize(sql: &str) -> Result<Vec<Token>, TokenizerError> {
    Tokenizer::new(&dialect(), sql).tokenize()
}

/// Parse a standalone boolean expression such as a join condition
pub fn parse_expr(sql: &str) -> Result<Expr, ParserError> {
    Parser::new(&dialect()).try_with_sql(sql)?.parse_expr()
}

/// Parse `sql` and return it only if it is exactly one statement
pub fn parse_single(sql: &str) -> Option<Statement> {
    let mut statements = parse_statements(sql).ok()?;
    if statements.len() == 1 {
        statements.pop()
    } else {
        None
    }
}

/// Unquoted last component of an object name (`"cctns"."FIR"` -> `FIR`)
pub fn object_name_to_table(name: &ObjectName) -> String {
    match name.0.last() {
        Some(ObjectNamePart::Identifier(ident)) => ident.value.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Unquoted qualifier parts in front of the table name, dot-joined
pub fn object_name_to_schema(name: &ObjectName) -> Option<String> {
    let (_, qualifier) = name.0.split_last()?;
    if qualifier.is_empty() {
        return None;
    }
    let parts: Vec<String> = qualifier
        .iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => ident.value.clone(),
            other => other.to_string(),
        })
        .collect();
    Some(parts.join("."))
}

/// Plain table behind a FROM/JOIN item, if it is one
pub fn table_ref(factor: &TableFactor) -> Option<TableRef> {
    match factor {
        TableFactor::Table { name, alias, .. } => Some(TableRef {
            name: object_name_to_table(name),
            schema: object_name_to_schema(name),
            alias: alias.as_ref().map(|a| a.name.value.clone()),
        }),
        _ => None,
    }
}

/// Tables a FROM item brings into scope, joins included
pub fn from_scope(from: &TableWithJoins) -> Vec<TableRef> {
    table_ref(&from.relation)
        .into_iter()
        .chain(from.joins.iter().filter_map(|j| table_ref(&j.relation)))
        .collect()
}

pub fn analyze(statement: &Statement) -> StatementAnalysis {
    let mut visitor = StructureVisitor::default();
    let _ = statement.visit(&mut visitor);

    let mut analysis = visitor.analysis;
    let ctes = analysis.cte_names.clone();
    analysis
        .tables
        .retain(|t| !ctes.iter().any(|c| c.eq_ignore_ascii_case(&t.name)));
    analysis
}

/// Table names referenced by `sql`; empty when the statement does not parse
pub fn extract_tables(sql: &str) -> Vec<String> {
    match parse_statements(sql) {
        Ok(statements) => {
            let mut names: Vec<String> = Vec::new();
            for statement in &statements {
                for name in analyze(statement).table_names() {
                    if !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                        names.push(name);
                    }
                }
            }
            names
        }
        Err(_) => Vec::new(),
    }
}

/// Outermost query of a statement, if it is a query at all
pub fn top_query(statement: &Statement) -> Option<&Query> {
    match statement {
        Statement::Query(query) => Some(query),
        _ => None,
    }
}

/// SELECT blocks directly in a query body, walking set operations
pub fn selects_in(body: &SetExpr) -> Vec<&Select> {
    let mut out = Vec::new();
    collect_selects(body, &mut out);
    out
}

fn collect_selects<'a>(body: &'a SetExpr, out: &mut Vec<&'a Select>) {
    match body {
        SetExpr::Select(select) => out.push(select.as_ref()),
        SetExpr::SetOperation { left, right, .. } => {
            collect_selects(left, out);
            collect_selects(right, out);
        }
        _ => {}
    }
}

/// Whether any column reference appears anywhere inside `node`
pub fn references_column<V: Visit>(node: &V) -> bool {
    visit_expressions(node, |expr| match expr {
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) => ControlFlow::Break(()),
        _ => ControlFlow::Continue(()),
    })
    .is_break()
}

/// Function calls in `expr` that take a column as (part of) an argument
pub fn functions_over_columns(expr: &Expr) -> Vec<String> {
    let mut found = Vec::new();
    let _ = visit_expressions(expr, |e| {
        if let Expr::Function(function) = e {
            if references_column(function) {
                let name = function.name.to_string().to_uppercase();
                if !found.contains(&name) {
                    found.push(name);
                }
            }
        }
        ControlFlow::<()>::Continue(())
    });
    found
}

/// Significant (non-whitespace, non-comment) tokens
pub fn significant_tokens(tokens: &[Token]) -> Vec<&Token> {
    tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_)))
        .collect()
}

/// Unquoted keyword-like word, upper-cased
pub fn bare_word(token: &Token) -> Option<String> {
    match token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.value.to_uppercase()),
        _ => None,
    }
}

/// Rewrite `TABLE.column` qualifiers in `condition` to the aliases in use.
///
/// Works on the token stream, so only identifiers directly followed by a
/// period are touched.
pub fn requalify(condition: &str, tables: &[TableRef]) -> Result<String, TokenizerError> {
    let tokens = tokenize(condition)?;
    let mut out = String::with_capacity(condition.len());

    for (idx, token) in tokens.iter().enumerate() {
        let followed_by_period = matches!(tokens.get(idx + 1), Some(Token::Period));
        match token {
            Token::Word(word) if followed_by_period => {
                match tables.iter().find(|t| t.name.eq_ignore_ascii_case(&word.value)) {
                    Some(table) => out.push_str(table.reference()),
                    None => out.push_str(&token.to_string()),
                }
            }
            _ => out.push_str(&token.to_string()),
        }
    }

    Ok(out)
}

#[derive(Debug, Default)]
struct StructureVisitor {
    analysis: StatementAnalysis,
}

impl Visitor for StructureVisitor {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.analysis.cte_names.push(cte.alias.name.value.clone());
            }
        }

        for select in selects_in(&query.body) {
            self.analysis.select_count += 1;
            self.analysis.join_count += select.from.len().saturating_sub(1);
            self.analysis.join_count += select.from.iter().map(|t| t.joins.len()).sum::<usize>();
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<()> {
        match table_factor {
            TableFactor::Table { .. } => {
                self.analysis.tables.extend(table_ref(table_factor));
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.analysis.join_count += table_with_joins.joins.len();
            }
            TableFactor::Derived { .. } => {}
            other => self.analysis.unsupported_relations.push(other.to_string()),
        }
        ControlFlow::Continue(())
    }
}
