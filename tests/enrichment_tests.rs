//! Enrichment pass wired to the real OpenCitations and ORCID clients.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use paper_aggregate::apis::opencitations::OpenCitationsClient;
use paper_aggregate::apis::orcid::{AuthorProfile, OrcidClient};
use paper_aggregate::rate_limit::RateLimiter;
use paper_aggregate::{Enricher, Paper, Source};

const TIMEOUT: Duration = Duration::from_secs(5);

fn paper(id: &str, doi: Option<&str>, authors: &[&str]) -> Paper {
    let mut p = Paper::new(id, Source::CrossRef);
    p.title = format!("Title {}", id);
    p.doi = doi.map(String::from);
    p.authors = authors.iter().map(|a| a.to_string()).collect();
    p.published_date = "2020-01-01".into();
    p
}

fn enricher(citations: &MockServer, orcid: &MockServer) -> Enricher {
    Enricher::new(
        Arc::new(OpenCitationsClient::new(TIMEOUT).with_base_url(citations.uri())),
        Arc::new(OrcidClient::new(TIMEOUT).with_base_url(orcid.uri())),
    )
    .with_limiters(
        RateLimiter::with_interval(Duration::ZERO),
        RateLimiter::with_interval(Duration::ZERO),
    )
}

#[tokio::test]
async fn test_enrichment_attaches_links_and_profiles() {
    let citations = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/citations/10.1%2Fok"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"oci": "a", "citing": "10.1/c1", "cited": "10.1/ok", "creation": "2021-01"}]"#,
        ))
        .expect(1)
        .mount(&citations)
        .await;
    Mock::given(method("GET"))
        .and(path("/references/10.1%2Fok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&citations)
        .await;
    // Server-side failure for the second DOI leaves that paper untouched.
    Mock::given(method("GET"))
        .and(path_regex(r"^/(citations|references)/10\.1%2Fbroken$"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&citations)
        .await;

    let orcid = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/expanded-search/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"expanded-result": [{"orcid-id": "0000-0001-0000-0001", "institution-name": []}]}"#,
        ))
        .mount(&orcid)
        .await;

    let enricher = enricher(&citations, &orcid);
    let papers = vec![
        paper("crossref_1", Some("10.1/ok"), &["Ada Lovelace"]),
        paper("crossref_2", Some("10.1/broken"), &[]),
    ];
    let out = enricher.enrich(papers, true, 2026).await;

    assert_eq!(out[0].citing_papers.len(), 1);
    assert_eq!(out[0].citing_papers[0].citing, "10.1/c1");
    assert!(out[0].cited_papers.is_empty());
    assert_eq!(
        out[0].author_profiles,
        vec![AuthorProfile {
            name: "Ada Lovelace".into(),
            orcid: Some("0000-0001-0000-0001".into()),
            affiliation: None,
        }]
    );

    assert!(out[1].citing_papers.is_empty());
    assert!(out[1].author_profiles.is_empty());
    assert!(out.iter().all(|p| p.quality_score.is_some() && p.impact_metrics.is_some()));
}

#[tokio::test]
async fn test_oversized_sets_make_no_requests() {
    let citations = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(0)
        .mount(&citations)
        .await;
    let orcid = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(0)
        .mount(&orcid)
        .await;

    let enricher = enricher(&citations, &orcid);
    let papers: Vec<_> = (0..enricher.policy().max_results + 1)
        .map(|i| paper(&format!("crossref_{}", i), Some("10.1/ok"), &["Someone"]))
        .collect();
    let out = enricher.enrich(papers, true, 2026).await;
    assert!(out.iter().all(|p| p.relevance_score.is_some() && p.citing_papers.is_empty()));
}
