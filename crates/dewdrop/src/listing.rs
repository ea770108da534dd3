//! Listing and CSV export.

use crate::select::{Select, SortDirection};
use asupersync::{Cx, Outcome};
use dewdrop_core::error::FieldError;
use dewdrop_core::{Connection, Error, RequestContext, Result, Row, Value};
use dewdrop_fields::{CellContent, CsvCell, Field, Fields, Helper, SortKey, VisibilityFilter};
use std::cmp::Ordering;

/// Header labels and cell text of a rendered listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A listing screen: the fields to show and the query that feeds them.
#[derive(Debug, Clone)]
pub struct Listing {
    fields: Fields,
    select: Select,
}

/// Quote a CSV cell when it contains a quote, comma, CR or LF.
pub fn csv_escape(cell: &str) -> String {
    if cell.contains(['"', ',', '\r', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Order two sort keys: NULL first, numbers numerically, then text.
fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        if !matches!(a, Value::Text(_)) && !matches!(b, Value::Text(_)) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
    }
    a.to_display_string().cmp(&b.to_display_string())
}

impl Listing {
    pub fn new(fields: Fields, select: Select) -> Self {
        Self { fields, select }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    pub fn select(&self) -> &Select {
        &self.select
    }

    /// Replace the query, e.g. to add a filter or page.
    pub fn set_select(&mut self, select: Select) {
        self.select = select;
    }

    /// Run the listing query.
    pub async fn fetch_rows<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Vec<Row>, Error> {
        self.select.all(cx, conn).await
    }

    #[allow(clippy::result_large_err)]
    fn render_cells(
        &self,
        helper: &dyn Helper,
        columns: &[&Field],
        rows: &[Row],
    ) -> Result<Vec<Vec<String>>> {
        let callables = columns
            .iter()
            .map(|f| self.fields.helper_callable(helper, f.name()))
            .collect::<Result<Vec<_>>>()?;
        Ok(rows
            .iter()
            .map(|row| {
                callables
                    .iter()
                    .map(|callable| callable(row).to_display_string())
                    .collect()
            })
            .collect())
    }

    /// Header labels and cell text for the request's user, narrowed by `filter`.
    #[allow(clippy::result_large_err)]
    pub fn render_table(
        &self,
        ctx: &RequestContext<'_>,
        filter: &VisibilityFilter,
        rows: &[Row],
    ) -> Result<RenderedTable> {
        let columns = self.fields.visible_fields(ctx.user(), filter);
        Ok(RenderedTable {
            headers: columns.iter().map(|f| f.label().to_string()).collect(),
            rows: self.render_cells(&CellContent, &columns, rows)?,
        })
    }

    /// CSV export: a header line then one line per row, CRLF-terminated.
    #[allow(clippy::result_large_err)]
    pub fn render_csv(
        &self,
        ctx: &RequestContext<'_>,
        filter: &VisibilityFilter,
        rows: &[Row],
    ) -> Result<String> {
        let columns = self.fields.visible_fields(ctx.user(), filter);
        let cells = self.render_cells(&CsvCell, &columns, rows)?;

        let mut out = String::new();
        let header: Vec<String> = columns.iter().map(|f| csv_escape(f.label())).collect();
        out.push_str(&header.join(","));
        out.push_str("\r\n");
        for line in cells {
            let line: Vec<String> = line.iter().map(|c| csv_escape(c)).collect();
            out.push_str(&line.join(","));
            out.push_str("\r\n");
        }
        tracing::debug!(rows = rows.len(), columns = columns.len(), "CSV rendered");
        Ok(out)
    }

    /// Sort `rows` in place by the [`SortKey`] of `field`. The sort is stable.
    ///
    /// Fails with `NotSortable` when the request's user may not sort by `field`.
    #[allow(clippy::result_large_err)]
    pub fn sort_by(
        &self,
        ctx: &RequestContext<'_>,
        rows: &mut [Row],
        field: &str,
        direction: SortDirection,
    ) -> Result<()> {
        if let Some(f) = self.fields.get(field) {
            if !f.sortable().allows(ctx.user()) {
                tracing::debug!(field, "Sort rejected by permission");
                return Err(Error::Field(FieldError::NotSortable {
                    field: field.to_string(),
                }));
            }
        }
        let key = self.fields.helper_callable(&SortKey, field)?;
        let mut keyed: Vec<(Value, Row)> = rows.iter().map(|r| (key(r), r.clone())).collect();
        keyed.sort_by(|(a, _), (b, _)| match direction {
            SortDirection::Asc => compare_keys(a, b),
            SortDirection::Desc => compare_keys(b, a),
        });
        for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
            *slot = row;
        }
        Ok(())
    }
}
