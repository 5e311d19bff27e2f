use sqlparser::ast::{
    Expr, Ident, Join, JoinConstraint, JoinOperator, Query, Select, SelectItem, SetExpr,
    Statement, TableWithJoins, VisitMut, VisitorMut,
};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::SchemaCatalog;
use crate::validation::sql_analysis::{
    analyze, from_scope, parse_expr, parse_single, requalify, table_ref, TableRef,
};

/// Rewrites candidate statements so implicit joins and ambiguous columns
/// become explicit, using the join hints in the catalog.
pub struct SchemaEnhancer {
    catalog: Arc<SchemaCatalog>,
}

impl SchemaEnhancer {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }

    /// Enhance `sql`, returning it untouched when there is nothing to add
    pub fn enhance(&self, sql: &str) -> String {
        let Some(mut statement) = parse_single(sql) else {
            debug!("Enhancer skipped statement that does not parse");
            return sql.to_string();
        };

        if analyze(&statement).tables.len() < 2 {
            return sql.to_string();
        }

        let Statement::Query(query) = &mut statement else {
            return sql.to_string();
        };

        let mut changed = false;
        for select in selects_mut(&mut query.body) {
            changed |= self.make_joins_explicit(select, sql);
            changed |= self.qualify_ambiguous_columns(select);
        }

        if !changed {
            return sql.to_string();
        }

        let enhanced = statement.to_string();
        info!("Enhanced SQL with catalog join hints");
        debug!("Enhanced SQL: {}", enhanced);
        enhanced
    }

    fn make_joins_explicit(&self, select: &mut Select, sql: &str) -> bool {
        let mut changed = false;

        for from in select.from.iter_mut() {
            let mut scope: Vec<TableRef> = table_ref(&from.relation).into_iter().collect();
            for join in from.joins.iter_mut() {
                let Some(joined) = table_ref(&join.relation) else {
                    continue;
                };
                if let Some(constraint) = missing_constraint(&mut join.join_operator) {
                    if let Some(condition) = self.hint_condition(&scope, &joined, sql) {
                        *constraint = JoinConstraint::On(condition);
                        changed = true;
                    }
                }
                scope.push(joined);
            }
        }

        if select.from.len() < 2 {
            return changed;
        }

        // Fold comma-separated FROM items into the first one for as long as
        // a hint connects them; the remainder keeps its original order.
        let mut items = std::mem::take(&mut select.from).into_iter();
        let Some(mut head) = items.next() else {
            return changed;
        };
        let mut scope = from_scope(&head);
        let mut rest: Vec<TableWithJoins> = Vec::new();

        for item in items {
            if !rest.is_empty() {
                rest.push(item);
                continue;
            }
            let hinted = table_ref(&item.relation).and_then(|joined| {
                self.hint_condition(&scope, &joined, sql)
                    .map(|condition| (joined, condition))
            });
            match hinted {
                Some((joined, condition)) => {
                    scope.push(joined);
                    scope.extend(item.joins.iter().filter_map(|j| table_ref(&j.relation)));
                    head.joins.push(Join {
                        relation: item.relation,
                        global: false,
                        join_operator: JoinOperator::Inner(JoinConstraint::On(condition)),
                    });
                    head.joins.extend(item.joins);
                    changed = true;
                }
                None => rest.push(item),
            }
        }

        select.from = std::iter::once(head).chain(rest).collect();
        changed
    }

    /// Join condition connecting `joined` to a table already in scope,
    /// unless that exact condition text is already in the statement
    fn hint_condition(&self, scope: &[TableRef], joined: &TableRef, sql: &str) -> Option<Expr> {
        for existing in scope {
            let Some(hint) = self.catalog.join_hint(&existing.name, &joined.name) else {
                continue;
            };
            let condition = requalify(&hint.condition, &[existing.clone(), joined.clone()]).ok()?;
            if sql.contains(&condition) {
                debug!("Join condition already present: {}", condition);
                return None;
            }
            return parse_expr(&condition).ok();
        }
        None
    }

    fn qualify_ambiguous_columns(&self, select: &mut Select) -> bool {
        let scope: Vec<TableRef> = select.from.iter().flat_map(from_scope).collect();
        if scope.len() < 2 {
            return false;
        }
        let names: Vec<&str> = scope.iter().map(|t| t.name.as_str()).collect();

        let qualifier_for = |column: &str| -> Option<String> {
            let owners = self.catalog.tables_with_column(column, &names);
            if owners.len() < 2 {
                return None;
            }
            scope
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(owners[0]))
                .map(|t| t.reference().to_string())
        };

        let mut changed = false;

        for item in select.projection.iter_mut() {
            if let SelectItem::UnnamedExpr(Expr::Identifier(ident)) = item {
                if let Some(qualifier) = qualifier_for(&ident.value) {
                    let column = ident.clone();
                    *item = SelectItem::ExprWithAlias {
                        expr: Expr::CompoundIdentifier(vec![Ident::new(qualifier), column.clone()]),
                        alias: column,
                    };
                    changed = true;
                }
            }
        }

        if let Some(selection) = select.selection.as_mut() {
            let mut qualifier = OuterColumnQualifier {
                qualifier_for,
                depth: 0,
                changed: false,
            };
            let _ = selection.visit(&mut qualifier);
            changed |= qualifier.changed;
        }

        changed
    }
}

/// Constraint slot of a plain or INNER join that has none yet
fn missing_constraint(operator: &mut JoinOperator) -> Option<&mut JoinConstraint> {
    match operator {
        JoinOperator::Join(constraint) | JoinOperator::Inner(constraint)
            if matches!(constraint, JoinConstraint::None) =>
        {
            Some(constraint)
        }
        _ => None,
    }
}

/// Qualifies bare column names of the enclosing SELECT only. Identifiers
/// inside nested queries resolve against their own FROM clause.
struct OuterColumnQualifier<F> {
    qualifier_for: F,
    depth: usize,
    changed: bool,
}

impl<F> VisitorMut for OuterColumnQualifier<F>
where
    F: Fn(&str) -> Option<String>,
{
    type Break = ();

    fn pre_visit_query(&mut self, _query: &mut Query) -> ControlFlow<()> {
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &mut Query) -> ControlFlow<()> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<()> {
        if self.depth > 0 {
            return ControlFlow::Continue(());
        }
        if let Expr::Identifier(ident) = expr {
            if let Some(qualifier) = (self.qualifier_for)(&ident.value) {
                let column = ident.clone();
                *expr = Expr::CompoundIdentifier(vec![Ident::new(qualifier), column]);
                self.changed = true;
            }
        }
        ControlFlow::Continue(())
    }
}

fn selects_mut(body: &mut SetExpr) -> Vec<&mut Select> {
    let mut out = Vec::new();
    collect_selects_mut(body, &mut out);
    out
}

fn collect_selects_mut<'a>(body: &'a mut SetExpr, out: &mut Vec<&'a mut Select>) {
    match body {
        SetExpr::Select(select) => out.push(select.as_mut()),
        SetExpr::SetOperation { left, right, .. } => {
            collect_selects_mut(left, out);
            collect_selects_mut(right, out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enhancer() -> SchemaEnhancer {
        SchemaEnhancer::new(Arc::new(SchemaCatalog::cctns()))
    }

    #[test]
    fn test_single_table_unchanged() {
        let sql = "SELECT   fir_id FROM FIR where status = 'open'";
        assert_eq!(enhancer().enhance(sql), sql);
    }

    #[test]
    fn test_unparseable_unchanged() {
        let sql = "SELECT FROM FROM";
        assert_eq!(enhancer().enhance(sql), sql);
    }

    #[test]
    fn test_explicit_query_unchanged() {
        let sql = "SELECT ct.description AS crime_type, COUNT(*) AS count \
                   FROM FIR f \
                   JOIN DISTRICT_MASTER d ON f.district_id = d.district_id \
                   JOIN CRIME_TYPE_MASTER ct ON f.crime_type_id = ct.crime_type_id \
                   WHERE d.district_name = 'Guntur' \
                   GROUP BY ct.description ORDER BY count DESC";
        assert_eq!(enhancer().enhance(sql), sql);
    }

    #[test]
    fn test_comma_join_made_explicit() {
        let enhanced = enhancer()
            .enhance("SELECT f.fir_number, d.district_name FROM FIR f, DISTRICT_MASTER d");
        assert!(enhanced.contains("JOIN DISTRICT_MASTER"), "{}", enhanced);
        assert!(enhanced.contains("ON f.district_id = d.district_id"), "{}", enhanced);
        assert!(!enhanced.contains(", DISTRICT_MASTER"), "{}", enhanced);
    }

    #[test]
    fn test_existing_condition_not_duplicated() {
        let sql = "SELECT * FROM FIR f, DISTRICT_MASTER d WHERE f.district_id = d.district_id";
        assert_eq!(enhancer().enhance(sql), sql);
    }

    #[test]
    fn test_constraintless_join_gets_condition() {
        let enhanced = enhancer().enhance("SELECT a.person_name FROM ARREST a INNER JOIN FIR f");
        assert!(enhanced.contains("ON a.fir_id = f.fir_id"), "{}", enhanced);
    }

    #[test]
    fn test_plain_join_gets_condition() {
        let e = enhancer();
        let enhanced = e.enhance("SELECT a.person_name FROM ARREST a JOIN FIR f");
        assert_eq!(
            enhanced,
            "SELECT a.person_name FROM ARREST a JOIN FIR f ON a.fir_id = f.fir_id"
        );
        assert_eq!(e.enhance(&enhanced), enhanced);
    }

    #[test]
    fn test_outer_join_untouched() {
        let sql = "SELECT * FROM ARREST a LEFT JOIN FIR f ON TRUE";
        assert_eq!(enhancer().enhance(sql), sql);
    }

    #[test]
    fn test_subquery_columns_keep_their_own_scope() {
        let e = enhancer();
        let enhanced = e.enhance(
            "SELECT f.fir_id FROM FIR f \
             JOIN DISTRICT_MASTER d ON f.district_id = d.district_id \
             WHERE district_id IN (SELECT district_id FROM STATION_MASTER)",
        );
        assert_eq!(
            enhanced,
            "SELECT f.fir_id FROM FIR f \
             JOIN DISTRICT_MASTER d ON f.district_id = d.district_id \
             WHERE f.district_id IN (SELECT district_id FROM STATION_MASTER)"
        );
        assert_eq!(e.enhance(&enhanced), enhanced);
    }

    #[test]
    fn test_exists_subquery_untouched() {
        let sql = "SELECT f.fir_id FROM FIR f \
                   JOIN DISTRICT_MASTER d ON f.district_id = d.district_id \
                   WHERE EXISTS (SELECT 1 FROM STATION_MASTER s WHERE district_id = 3)";
        assert_eq!(enhancer().enhance(sql), sql);
    }

    #[test]
    fn test_union_branches_enhanced_independently() {
        let e = enhancer();
        let enhanced = e.enhance(
            "SELECT a.person_name FROM ARREST a JOIN FIR f \
             UNION SELECT d.district_name FROM FIR f, DISTRICT_MASTER d",
        );
        assert_eq!(
            enhanced,
            "SELECT a.person_name FROM ARREST a JOIN FIR f ON a.fir_id = f.fir_id \
             UNION SELECT d.district_name FROM FIR f \
             INNER JOIN DISTRICT_MASTER d ON f.district_id = d.district_id"
        );
        assert_eq!(e.enhance(&enhanced), enhanced);
    }

    #[test]
    fn test_quoted_identifiers_keep_quotes() {
        let e = enhancer();
        let enhanced = e.enhance(
            "SELECT \"district_id\" FROM \"FIR\" f \
             JOIN \"DISTRICT_MASTER\" d ON f.district_id = d.district_id",
        );
        assert_eq!(
            enhanced,
            "SELECT f.\"district_id\" AS \"district_id\" FROM \"FIR\" f \
             JOIN \"DISTRICT_MASTER\" d ON f.district_id = d.district_id"
        );
        assert_eq!(e.enhance(&enhanced), enhanced);
    }

    #[test]
    fn test_unrelated_tables_left_alone() {
        let sql = "SELECT * FROM DISTRICT_MASTER, CRIME_TYPE_MASTER";
        assert_eq!(enhancer().enhance(sql), sql);
    }

    #[test]
    fn test_ambiguous_columns_qualified() {
        let enhanced = enhancer().enhance(
            "SELECT district_id, district_name FROM FIR f \
             JOIN DISTRICT_MASTER d ON f.district_id = d.district_id \
             WHERE district_id > 2",
        );
        assert!(enhanced.contains("f.district_id AS district_id"), "{}", enhanced);
        assert!(enhanced.contains("WHERE f.district_id > 2"), "{}", enhanced);
        assert!(!enhanced.contains("d.district_name"), "{}", enhanced);
    }

    #[test]
    fn test_enhance_is_idempotent() {
        let e = enhancer();
        for sql in [
            "SELECT f.fir_number, d.district_name FROM FIR f, DISTRICT_MASTER d",
            "SELECT district_id FROM FIR f JOIN STATION_MASTER s ON f.station_id = s.station_id",
            "SELECT * FROM ARREST a, FIR f, OFFICER_MASTER o",
            "SELECT fir_id FROM FIR",
        ] {
            let once = e.enhance(sql);
            let twice = e.enhance(&once);
            assert_eq!(once, twice, "not idempotent for {}", sql);
        }
    }
}
