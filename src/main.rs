use std::sync::Arc;

use paper_aggregate::config::Config;
use paper_aggregate::scoring;
use paper_aggregate::search::{paginate, SearchEngine, SearchFilters, SortKey, SourceSelection};
use paper_aggregate::{Enricher, SearchError};
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// ── Parameter structs ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchPapersParams {
    #[schemars(description = "Search query string")]
    query: String,
    #[schemars(description = "Restrict to one source: arxiv, crossref, semantic_scholar, openalex, pubmed, doaj (default all)")]
    source: Option<String>,
    #[schemars(description = "Sort key: relevance (default), date, citations, quality, impact, velocity, title")]
    sort: Option<String>,
    #[schemars(description = "Upstream page number (default 1)")]
    page: Option<u32>,
    #[schemars(description = "Results requested per source (default 20)")]
    per_page: Option<u32>,
    #[schemars(description = "Earliest publication year (inclusive)")]
    year_from: Option<i32>,
    #[schemars(description = "Latest publication year (inclusive)")]
    year_to: Option<i32>,
    #[schemars(description = "Case-insensitive author name substring")]
    author: Option<String>,
    #[schemars(description = "arXiv category code: cs, math, physics, bio, econ, stat")]
    category: Option<String>,
    #[schemars(description = "Treat the query as an exact phrase")]
    exact_phrase: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GetPageParams {
    #[schemars(description = "1-based page of the current results")]
    page: usize,
    #[schemars(description = "Results per page (default 10)")]
    per_page: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExportParams {
    #[schemars(description = "Export format: json or csv")]
    format: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EnrichParams {
    #[schemars(description = "Also resolve author identities via ORCID (slow)")]
    include_authors: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SuggestParams {
    #[schemars(description = "Partial query, at least 2 characters")]
    prefix: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BookmarkParams {
    #[schemars(description = "Paper id from the current results (e.g. arxiv_2301.12345v1)")]
    id: String,
}

const DISPLAY_PER_PAGE: usize = 10;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse<'a> {
    query: &'a str,
    report: paper_aggregate::SearchReport,
    #[serde(flatten)]
    page: paper_aggregate::search::Page,
}

fn to_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PaperAggregateServer {
    tool_router: ToolRouter<Self>,
    config: Arc<Config>,
    engine: Arc<SearchEngine>,
    enricher: Arc<Enricher>,
}

#[tool_router]
impl PaperAggregateServer {
    pub fn create() -> anyhow::Result<Self> {
        let config = Config::from_env();
        let engine = config.build_engine();
        let enricher = config.build_enricher();

        tracing::info!(
            "Initialized {} paper sources, data_dir={}",
            engine.sources().count(),
            config.data_dir.display()
        );

        Ok(Self {
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            engine: Arc::new(engine),
            enricher: Arc::new(enricher),
        })
    }

    #[tool(description = "List available paper sources and their status")]
    async fn list_sources(&self) -> Result<CallToolResult, McpError> {
        to_json(&self.config.source_status())
    }

    #[tool(description = "Search papers across all enabled sources concurrently. Returns the first page of deduplicated, filtered, sorted results plus per-source outcome counts.")]
    async fn search_papers(
        &self,
        Parameters(params): Parameters<SearchPapersParams>,
    ) -> Result<CallToolResult, McpError> {
        let source: SourceSelection = params
            .source
            .as_deref()
            .unwrap_or("all")
            .parse()
            .map_err(|e: String| McpError::invalid_params(e, None))?;
        let sort: SortKey = params
            .sort
            .as_deref()
            .unwrap_or("relevance")
            .parse()
            .map_err(|e: String| McpError::invalid_params(e, None))?;

        let defaults = SearchFilters::default();
        let filters = SearchFilters {
            source,
            sort,
            page: params.page.unwrap_or(defaults.page).max(1),
            per_page: params.per_page.unwrap_or(defaults.per_page).max(1),
            year_from: params.year_from,
            year_to: params.year_to,
            author: params.author,
            category: params.category,
            exact_phrase: params.exact_phrase.unwrap_or(false),
        };

        match self.engine.try_search(&params.query, &filters).await {
            Ok(Some(run)) => to_json(&SearchResponse {
                query: &params.query,
                report: run.report,
                page: paginate(&run.results, run.results.len(), 1, DISPLAY_PER_PAGE),
            }),
            Ok(None) => Ok(CallToolResult::error(vec![Content::text(
                "A search is already in progress; retry when it completes.",
            )])),
            Err(e @ SearchError::AllSourcesUnavailable { .. }) => {
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    #[tool(description = "Get a page of the current search results")]
    async fn get_page(
        &self,
        Parameters(params): Parameters<GetPageParams>,
    ) -> Result<CallToolResult, McpError> {
        let per_page = params.per_page.unwrap_or(DISPLAY_PER_PAGE);
        to_json(&self.engine.get_page(params.page, per_page).await)
    }

    #[tool(description = "Export the current search results as json or csv")]
    async fn export_results(
        &self,
        Parameters(params): Parameters<ExportParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.engine.export_results(&params.format).await {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e @ SearchError::UnsupportedFormat(_)) => {
                Err(McpError::invalid_params(e.to_string(), None))
            }
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    #[tool(description = "Score the current results and, for sets of at most 50, attach OpenCitations citation links and optionally ORCID author profiles")]
    async fn enrich_results(
        &self,
        Parameters(params): Parameters<EnrichParams>,
    ) -> Result<CallToolResult, McpError> {
        let results = self.engine.current_results().await;
        let enriched = self
            .enricher
            .enrich(
                results,
                params.include_authors.unwrap_or(false),
                scoring::current_year(),
            )
            .await;
        to_json(&enriched)
    }

    #[tool(description = "List recent search queries, most recent first")]
    async fn recent_searches(&self) -> Result<CallToolResult, McpError> {
        to_json(&self.engine.history().await)
    }

    #[tool(description = "Suggest queries from search history and common academic terms")]
    async fn suggest_queries(
        &self,
        Parameters(params): Parameters<SuggestParams>,
    ) -> Result<CallToolResult, McpError> {
        to_json(&self.engine.suggestions(&params.prefix).await)
    }

    #[tool(description = "Bookmark a paper from the current results by id")]
    async fn bookmark_paper(
        &self,
        Parameters(params): Parameters<BookmarkParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self
            .engine
            .bookmark(&params.id)
            .await
            .map_err(|e| McpError::internal_error(format!("Bookmark store error: {}", e), None))?;
        let message = match outcome {
            Some(true) => format!("Bookmarked: {}", params.id),
            Some(false) => format!("Already bookmarked: {}", params.id),
            None => {
                return Err(McpError::invalid_params(
                    format!("Paper not in current results: {}", params.id),
                    None,
                ))
            }
        };
        Ok(CallToolResult::success(vec![Content::text(message)]))
    }

    #[tool(description = "List bookmarked papers")]
    async fn list_bookmarks(&self) -> Result<CallToolResult, McpError> {
        let bookmarks = self
            .engine
            .bookmarks()
            .await
            .map_err(|e| McpError::internal_error(format!("Bookmark store error: {}", e), None))?;
        to_json(&bookmarks)
    }
}

#[tool_handler]
impl ServerHandler for PaperAggregateServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Search academic papers across arXiv, CrossRef, Semantic Scholar, OpenAlex, \
                 PubMed and DOAJ at once. Results are merged, deduplicated by title, \
                 filtered and ranked; page, export, enrich and bookmark them with the \
                 other tools."
                    .into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting paper-aggregate MCP server");

    let server = PaperAggregateServer::create()?;
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
