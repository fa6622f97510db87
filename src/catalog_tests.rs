// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `catalog.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CATALOG: &str = r#"
svcA:
  ip:
    eqiad: 10.2.2.1
    codfw: 10.2.1.1
  discovery:
    - dnsdisc: svcA
      active_active: true
    - dnsdisc: svcA-ro
      active_active: true
svcB:
  state: production
  ip:
    eqiad: 10.2.2.2
    codfw: 10.2.1.2
  discovery:
    - dnsdisc: svcB
      active_active: false
new-service:
  state: lvs_setup
  ip:
    eqiad: 10.2.2.3
  discovery:
    - dnsdisc: new-service
      active_active: true
lvs-only:
  ip:
    eqiad: 10.2.2.4
docker-registry:
  ip:
    eqiad: 10.2.2.5
    codfw: 10.2.1.5
  discovery:
    - dnsdisc: docker-registry
      active_active: true
"#;

    fn names(records: &[DiscoveryRecord]) -> Vec<&str> {
        records.iter().map(DiscoveryRecord::name).collect()
    }

    fn services() -> BTreeMap<String, CatalogService> {
        parse_catalog(CATALOG, "test").unwrap()
    }

    #[test]
    fn test_state_defaults_to_production() {
        assert_eq!(services()["svcA"].state, "production");
        assert!(services()["lvs-only"].discovery.is_none());
    }

    #[test]
    fn test_classify_active_active_only() {
        let records = CatalogFilter::classify(&services(), false, &BTreeSet::new()).unwrap();

        assert_eq!(
            names(&records.active_active),
            vec!["docker-registry", "svcA", "svcA-ro"]
        );
        assert!(records.active_passive.is_empty());
    }

    #[test]
    fn test_classify_with_active_passive() {
        let records = CatalogFilter::classify(&services(), true, &BTreeSet::new()).unwrap();

        assert_eq!(names(&records.active_passive), vec!["svcB"]);
        assert_eq!(records.len(), 4);
        assert_eq!(
            records.find("svcB").unwrap().topology(),
            Topology::ActivePassive
        );
        assert_eq!(records.find("svcA-ro").unwrap().service(), "svcA");
    }

    #[test]
    fn test_classify_exclusions() {
        let exclude: BTreeSet<String> = ["docker-registry".to_string(), "svcA-ro".to_string()]
            .into_iter()
            .collect();
        let records = CatalogFilter::classify(&services(), true, &exclude).unwrap();

        assert_eq!(names(&records.active_active), vec!["svcA"]);
        assert_eq!(names(&records.active_passive), vec!["svcB"]);
    }

    #[test]
    fn test_classify_keeps_first_declaration_of_a_record() {
        let services = parse_catalog(
            r#"
api-a:
  ip:
    eqiad: 10.2.2.10
  discovery:
    - dnsdisc: api
      active_active: true
api-b:
  ip:
    codfw: 10.2.1.10
  discovery:
    - dnsdisc: api
      active_active: false
"#,
            "test",
        )
        .unwrap();
        let records = CatalogFilter::classify(&services, true, &BTreeSet::new()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(names(&records.active_active), vec!["api"]);
        assert!(records.active_passive.is_empty());
        assert_eq!(records.find("api").unwrap().service(), "api-a");
    }

    #[test]
    fn test_classify_keeps_site_ips() {
        let records = CatalogFilter::classify(&services(), false, &BTreeSet::new()).unwrap();
        let svc_a = records.find("svcA").unwrap();
        assert_eq!(
            svc_a.site_ip("codfw"),
            Some("10.2.1.1".parse().unwrap())
        );
        assert_eq!(svc_a.datacenters().collect::<Vec<_>>(), vec!["codfw", "eqiad"]);
    }

    #[test]
    fn test_discovery_without_endpoint_is_malformed() {
        let services = parse_catalog(
            "broken:\n  discovery:\n    - dnsdisc: broken\n      active_active: true\n",
            "test",
        )
        .unwrap();
        let err = CatalogFilter::classify(&services, false, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { .. }));
    }

    #[test]
    fn test_invalid_yaml_is_malformed() {
        let err = parse_catalog("svcA: [", "test").unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_yaml_catalog_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = YamlCatalog::new(file.path());
        let records = CatalogFilter::enumerate(&catalog, true, &BTreeSet::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_catalog_is_unreachable() {
        let catalog = YamlCatalog::new("/nonexistent/catalog.yaml");
        let err = CatalogFilter::enumerate(&catalog, false, &BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Unreachable { .. }));
    }
}
