use crate::domain::context::RequestContext;
use crate::domain::rows::DictionaryRow;
use crate::domain::scope::{Scope, ScopePrecedence};
use crate::domain::store::{ConfigRow, ConfigStore, PartnerTables, Table};
use crate::error::ConfigError;
use crate::settings::EngineSettings;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::trace;

static NO_TABLES: LazyLock<PartnerTables> = LazyLock::new(PartnerTables::default);

/// Picks the most specific applicable row per logical id for one request.
///
/// Lookup walks the requesting partner first and its template second. Within a partner,
/// every applicable row is ranked by [`Scope::rank`]; ties keep the row declared first.
pub struct ScopeResolver<'a> {
    store: &'a ConfigStore,
    chain: Vec<&'a PartnerTables>,
    partners: Vec<String>,
    country: String,
    flights: BTreeSet<String>,
    scenario: Option<String>,
    precedence: ScopePrecedence,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(store: &'a ConfigStore, settings: &EngineSettings, ctx: &RequestContext) -> Self {
        let mut partners = vec![ctx.partner_name.to_ascii_lowercase()];
        let template = ctx
            .template_name()
            .map(str::to_string)
            .or_else(|| settings.default_template.clone())
            .map(|t| t.to_ascii_lowercase());
        if let Some(template) = template.filter(|t| !partners.contains(t)) {
            partners.push(template);
        }
        let chain = partners.iter().filter_map(|p| store.partner(p)).collect();

        Self {
            store,
            chain,
            partners,
            country: ctx.country.to_ascii_lowercase(),
            flights: ctx.effective_flights(),
            scenario: ctx.scenario.clone(),
            precedence: settings.precedence_for(&ctx.partner_name),
        }
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn flights(&self) -> &BTreeSet<String> {
        &self.flights
    }

    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    /// Partner then template, lowercased, whether or not the store knows them.
    pub fn partners(&self) -> &[String] {
        &self.partners
    }

    /// Tables consulted, in lookup order.
    pub fn tables(&self) -> &[&'a PartnerTables] {
        &self.chain
    }

    pub fn applies(&self, scope: &Scope) -> bool {
        scope.applies(&self.country, &self.flights, self.scenario.as_deref())
    }

    pub fn try_resolve<T, F>(&self, id: &str, select: F) -> Option<&'a ConfigRow<T>>
    where
        F: Fn(&'a PartnerTables) -> &'a Table<T>,
    {
        self.chain
            .iter()
            .copied()
            .find_map(|tables| self.best(select(tables).candidates(id)))
    }

    pub fn resolve<T, F>(&self, id: &str, select: F) -> Result<&'a ConfigRow<T>, ConfigError>
    where
        F: Fn(&'a PartnerTables) -> &'a Table<T>,
    {
        match self.try_resolve(id, &select) {
            Some(row) => {
                trace!(id, line = row.origin.line, table = %row.origin.table, "resolved row");
                Ok(row)
            }
            None => Err(ConfigError::NotFound {
                table: select(&*NO_TABLES).kind(),
                id: id.to_string(),
            }),
        }
    }

    /// Every applicable row under `id`, in declaration order, from the first partner
    /// in the chain that has any.
    pub fn applicable<T, F>(&self, id: &str, select: F) -> Vec<&'a ConfigRow<T>>
    where
        F: Fn(&'a PartnerTables) -> &'a Table<T>,
    {
        self.chain
            .iter()
            .copied()
            .map(|tables| {
                select(tables)
                    .candidates(id)
                    .iter()
                    .filter(|row| self.applies(&row.scope))
                    .collect::<Vec<_>>()
            })
            .find(|rows| !rows.is_empty())
            .unwrap_or_default()
    }

    pub fn dictionary(&self, name: &str) -> Option<&'a ConfigRow<DictionaryRow>> {
        self.best(self.store.dictionaries().candidates(name))
    }

    fn best<T>(&self, rows: &'a [ConfigRow<T>]) -> Option<&'a ConfigRow<T>> {
        let mut best: Option<(&'a ConfigRow<T>, (u8, u8, u8))> = None;
        for row in rows.iter().filter(|row| self.applies(&row.scope)) {
            let rank = row.scope.rank(self.precedence);
            if best.is_none_or(|(_, current)| rank > current) {
                best = Some((row, rank));
            }
        }
        best.map(|(row, _)| row)
    }
}
