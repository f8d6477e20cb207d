//! Top-down walk over the hierarchy
//!
//! A level can only be crawled once the nodes of the level above exist, so
//! the walker runs one `LevelCrawlDriver` pass per level, shallowest first.
//! Regions come from the site's root list page.

use crate::crawler::driver::{CrawlContext, LevelCrawlDriver, LevelReport, NodeOutcome};
use crate::state::{Entity, Level, ScopeFilter};
use crate::storage::{BatchSink, EntityStore, InsertReport};
use crate::Result;

/// Which part of the hierarchy a walk covers
#[derive(Debug, Clone)]
pub struct WalkPlan {
    /// First level whose nodes are crawled
    pub from: Level,
    /// Last level whose nodes are crawled
    pub through: Level,
    pub filter: ScopeFilter,
    /// Re-read the root page even if regions already exist
    pub seed: bool,
}

impl Default for WalkPlan {
    fn default() -> Self {
        Self {
            from: Level::Region,
            through: Level::Street,
            filter: ScopeFilter::all(),
            seed: false,
        }
    }
}

impl WalkPlan {
    /// A plan crawling only `level`
    pub fn single(level: Level) -> Self {
        Self {
            from: level,
            through: level,
            ..Default::default()
        }
    }

    /// Levels crawled, shallowest first
    ///
    /// Levels above the deepest filter term are skipped since their nodes
    /// cannot be matched by it.
    pub fn levels(&self) -> Vec<Level> {
        let floor = self
            .filter
            .terms()
            .last()
            .map(|(level, _)| *level)
            .unwrap_or(Level::Region);

        Level::parent_levels()
            .into_iter()
            .filter(|level| *level >= self.from && *level <= self.through && *level >= floor)
            .collect()
    }
}

/// Summary of a walk
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    /// Set when the root page was read
    pub seeded: Option<InsertReport>,
    pub levels: Vec<(Level, LevelReport)>,
}

/// Runs level passes top-down over one store
pub struct HierarchyWalker<'a, S> {
    store: &'a mut S,
    ctx: &'a CrawlContext<'a>,
    root_path: String,
}

impl<'a, S> HierarchyWalker<'a, S>
where
    S: EntityStore + BatchSink<Entity>,
{
    pub fn new(store: &'a mut S, ctx: &'a CrawlContext<'a>, root_path: impl Into<String>) -> Self {
        Self {
            store,
            ctx,
            root_path: root_path.into(),
        }
    }

    /// Reads the root list page and inserts its items as `Todo` regions
    ///
    /// Only regions inside the filter's region (if any) are inserted. There
    /// is no node to record a failure on, so a root page that cannot be
    /// fetched or parsed is logged and nothing is inserted.
    pub async fn seed_regions(&mut self, filter: &ScopeFilter) -> Result<InsertReport> {
        let url = self.ctx.base_url.join(&self.root_path)?;
        tracing::info!("Seeding regions from {}", url);

        let mut governor = self.ctx.governor();
        let items = match self.ctx.visit(&mut governor, &url).await? {
            NodeOutcome::Children(items) => items,
            NodeOutcome::Empty => {
                tracing::warn!("Root page {} lists no regions", url);
                return Ok(InsertReport::default());
            }
            NodeOutcome::ParseFailed(e) => {
                tracing::error!("Cannot seed regions: {}", e);
                return Ok(InsertReport::default());
            }
            NodeOutcome::TransportFailed(e) => {
                tracing::error!("Cannot seed regions: {}", e);
                return Ok(InsertReport::default());
            }
        };

        let scope = region_scope(filter);
        let regions: Vec<Entity> = items
            .into_iter()
            .map(|item| Entity::region(item.id, item.name))
            .filter(|region| scope.matches(region))
            .collect();
        let report = self.ctx.writer().insert(&mut *self.store, &regions)?;
        tracing::info!(
            "Seeded {} regions ({} already known)",
            report.inserted,
            report.duplicates
        );
        Ok(report)
    }

    /// Runs the passes of `plan`
    ///
    /// Regions are seeded first when asked to, or when a walk starting at
    /// the region level finds none inside the filter's region.
    pub async fn walk(&mut self, plan: &WalkPlan) -> Result<WalkReport> {
        let mut report = WalkReport::default();

        let unseeded = plan.from == Level::Region
            && self
                .store
                .count_matching(Level::Region, &region_scope(&plan.filter))?
                == 0;
        if plan.seed || unseeded {
            report.seeded = Some(self.seed_regions(&plan.filter).await?);
        }

        for level in plan.levels() {
            let level_report = LevelCrawlDriver::new(&mut *self.store, self.ctx)
                .run(level, &plan.filter)
                .await?;
            if level_report.unfinished() > 0 {
                tracing::info!(
                    "{} {} nodes left unfinished, re-run to retry them",
                    level_report.unfinished(),
                    level
                );
            }
            report.levels.push((level, level_report));
        }

        Ok(report)
    }
}

/// The region term of `filter` alone
fn region_scope(filter: &ScopeFilter) -> ScopeFilter {
    filter
        .region_key()
        .map_or_else(ScopeFilter::all, ScopeFilter::region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::{context, list_page, LineParser, ScriptedFetcher, ScriptedResolver};
    use crate::state::CrawlStatus;
    use crate::storage::SqliteStore;

    const ROOT: &str = "/browse/homes/";
    const MD: &str = "/browse/homes/md/";
    const HOWARD: &str = "/browse/homes/md/howard-county/";
    const ZIP: &str = "/browse/homes/md/howard-county/20777/";
    const STREET: &str = "/browse/homes/md/howard-county/20777/main-st/";

    fn site() -> ScriptedFetcher {
        ScriptedFetcher::new()
            .page(ROOT, list_page(&[(MD, "Maryland")]))
            .page(MD, list_page(&[(HOWARD, "Howard County")]))
            .page(HOWARD, list_page(&[(ZIP, "20777")]))
            .page(ZIP, list_page(&[(STREET, "Main St")]))
            .page(
                STREET,
                list_page(&[
                    ("/homedetails/1-main-st/1_zpid/", "1 Main St"),
                    ("/homedetails/2-main-st/2_zpid/", "2 Main St"),
                ]),
            )
    }

    #[tokio::test]
    async fn test_full_walk_from_empty_store() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let fetcher = site();
        let resolver = ScriptedResolver::retrying();
        let ctx = context(&fetcher, &LineParser, &resolver);

        let report = HierarchyWalker::new(&mut store, &ctx, ROOT)
            .walk(&WalkPlan::default())
            .await
            .unwrap();

        assert_eq!(report.seeded.map(|s| s.inserted), Some(1));
        assert_eq!(report.levels.len(), 4);
        assert!(report.levels.iter().all(|(_, r)| r.finished == 1));

        assert_eq!(store.listing_shard_counts().unwrap(), vec![("md".to_string(), 2)]);
        let listing = store
            .get(Level::Listing, "/homedetails/1-main-st/1_zpid/")
            .unwrap()
            .unwrap();
        assert_eq!(
            listing.parents.chain(),
            vec!["md", "howard-county", "20777", "main-st"]
        );
        assert_eq!(listing.detail_status, Some(CrawlStatus::Todo));

        let street = store.get(Level::Street, STREET).unwrap().unwrap();
        assert_eq!(street.status, CrawlStatus::Finished);
        assert_eq!(street.child_count, Some(2));
    }

    #[tokio::test]
    async fn test_second_walk_fetches_nothing() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let fetcher = site();
        let resolver = ScriptedResolver::retrying();
        let ctx = context(&fetcher, &LineParser, &resolver);

        HierarchyWalker::new(&mut store, &ctx, ROOT)
            .walk(&WalkPlan::default())
            .await
            .unwrap();
        let second = HierarchyWalker::new(&mut store, &ctx, ROOT)
            .walk(&WalkPlan::default())
            .await
            .unwrap();

        assert!(second.seeded.is_none());
        assert!(second.levels.iter().all(|(_, r)| r.selected == 0));
        for path in [ROOT, MD, HOWARD, ZIP, STREET] {
            assert_eq!(fetcher.request_count(path), 1, "{} fetched again", path);
        }
        assert_eq!(store.count(Level::Listing).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_walk_stops_after_through_level() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let fetcher = site();
        let resolver = ScriptedResolver::retrying();
        let ctx = context(&fetcher, &LineParser, &resolver);
        let plan = WalkPlan {
            through: Level::SubRegion,
            ..Default::default()
        };

        HierarchyWalker::new(&mut store, &ctx, ROOT)
            .walk(&plan)
            .await
            .unwrap();

        assert_eq!(fetcher.request_count(ZIP), 0);
        let zip = store.get(Level::PostalArea, ZIP).unwrap().unwrap();
        assert_eq!(zip.status, CrawlStatus::Todo);
    }

    #[tokio::test]
    async fn test_unreachable_root_seeds_nothing() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let fetcher = ScriptedFetcher::new().down(ROOT);
        let resolver = ScriptedResolver::retrying();
        let ctx = context(&fetcher, &LineParser, &resolver);

        let report = HierarchyWalker::new(&mut store, &ctx, ROOT)
            .walk(&WalkPlan::default())
            .await
            .unwrap();

        assert_eq!(report.seeded, Some(InsertReport::default()));
        assert!(report.levels.iter().all(|(_, r)| r.selected == 0));
    }

    #[tokio::test]
    async fn test_seeding_honours_region_filter() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let fetcher = ScriptedFetcher::new().page(
            ROOT,
            list_page(&[(MD, "Maryland"), ("/browse/homes/va/", "Virginia")]),
        );
        let resolver = ScriptedResolver::retrying();
        let ctx = context(&fetcher, &LineParser, &resolver);

        let report = HierarchyWalker::new(&mut store, &ctx, ROOT)
            .seed_regions(&ScopeFilter::region("va"))
            .await
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert!(store.get(Level::Region, MD).unwrap().is_none());
        assert!(store.get(Level::Region, "/browse/homes/va/").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_region_scoped_walks_each_seed_their_region() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let fetcher = ScriptedFetcher::new()
            .page(
                ROOT,
                list_page(&[(MD, "Maryland"), ("/browse/homes/va/", "Virginia")]),
            )
            .page(MD, list_page(&[(HOWARD, "Howard County")]))
            .page(
                "/browse/homes/va/",
                list_page(&[("/browse/homes/va/fairfax-county/", "Fairfax County")]),
            );
        let resolver = ScriptedResolver::retrying();
        let ctx = context(&fetcher, &LineParser, &resolver);
        let scoped = |key: &str| WalkPlan {
            through: Level::Region,
            filter: ScopeFilter::region(key),
            ..Default::default()
        };

        let md = HierarchyWalker::new(&mut store, &ctx, ROOT)
            .walk(&scoped("md"))
            .await
            .unwrap();
        let va = HierarchyWalker::new(&mut store, &ctx, ROOT)
            .walk(&scoped("va"))
            .await
            .unwrap();

        assert_eq!(md.seeded.map(|s| s.inserted), Some(1));
        assert_eq!(va.seeded.map(|s| s.inserted), Some(1));
        assert_eq!(va.levels[0].1.finished, 1);
        let virginia = store.get(Level::Region, "/browse/homes/va/").unwrap().unwrap();
        assert_eq!(virginia.status, CrawlStatus::Finished);
        assert_eq!(store.count(Level::SubRegion).unwrap(), 2);

        // Both regions exist now, so a third run reads the root page no more
        let again = HierarchyWalker::new(&mut store, &ctx, ROOT)
            .walk(&scoped("va"))
            .await
            .unwrap();
        assert!(again.seeded.is_none());
        assert_eq!(fetcher.request_count(ROOT), 2);
    }

    #[test]
    fn test_plan_levels_respect_filter_depth() {
        let plan = WalkPlan {
            filter: ScopeFilter::region("md").with(Level::SubRegion, "howard-county"),
            ..Default::default()
        };
        assert_eq!(
            plan.levels(),
            vec![Level::SubRegion, Level::PostalArea, Level::Street]
        );
        assert_eq!(WalkPlan::single(Level::Street).levels(), vec![Level::Street]);
    }
}
