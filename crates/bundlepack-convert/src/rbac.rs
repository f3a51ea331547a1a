//! Service accounts and RBAC
//!
//! `permissions` become a ClusterRole/ClusterRoleBinding pair when the
//! operator watches all namespaces, and a Role/RoleBinding pair per watched
//! namespace otherwise. The choice depends on install-time values, so it is
//! written into the template and made by the renderer.

use bundlepack_core::{ClusterServiceVersion, StrategyDeploymentPermissions};
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeSet;

use crate::error::{ConvertError, Result};
use crate::helpers::{TARGET_NAMESPACES, TARGET_NAMESPACES_EXPR, TARGET_NAMESPACES_TPL};
use crate::manifest::{RELEASE_NAMESPACE, TemplateFile, TemplateObject, import};
use crate::naming::generate_name;
use crate::parametrize::Instruction;

const RBAC_API_VERSION: &str = "rbac.authorization.k8s.io/v1";
const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// One ServiceAccount per distinct account named by the permission sets
///
/// The `default` account exists in every namespace and is not emitted.
pub fn service_account_files(csv: &ClusterServiceVersion) -> Result<Vec<TemplateFile>> {
    let strategy = &csv.spec.install.spec;
    let names: BTreeSet<&str> = strategy
        .permissions
        .iter()
        .chain(&strategy.cluster_permissions)
        .map(|p| p.service_account_name.as_str())
        .filter(|name| *name != "default")
        .collect();

    let mut files = Vec::with_capacity(names.len());
    let mut errors = Vec::new();
    for name in names {
        let account = TemplateObject::new(json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": {"name": name}
        }))
        .in_release_namespace();
        match account.into_file() {
            Ok(file) => files.push(file),
            Err(e) => errors.push(e),
        }
    }
    ConvertError::collect(errors)?;
    Ok(files)
}

/// Role name shared by every object generated from one permission set
pub fn role_name(csv_name: &str, permissions: &StrategyDeploymentPermissions) -> Result<String> {
    let mut rules = permissions
        .rules
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rules.sort_by_cached_key(ToString::to_string);

    generate_name(
        csv_name,
        &json!({
            "serviceAccountName": permissions.service_account_name,
            "rules": rules,
        }),
    )
}

fn rules(permissions: &StrategyDeploymentPermissions) -> Result<JsonValue> {
    Ok(serde_json::to_value(&permissions.rules)?)
}

fn role(kind: &str, name: &str, rules: JsonValue) -> TemplateObject {
    TemplateObject::new(json!({
        "apiVersion": RBAC_API_VERSION,
        "kind": kind,
        "metadata": {"name": name},
        "rules": rules
    }))
}

fn binding(kind: &str, role_kind: &str, name: &str, service_account: &str) -> TemplateObject {
    TemplateObject::new(json!({
        "apiVersion": RBAC_API_VERSION,
        "kind": kind,
        "metadata": {"name": name},
        "roleRef": {"apiGroup": RBAC_GROUP, "kind": role_kind, "name": name},
        "subjects": [{"kind": "ServiceAccount", "name": service_account, "namespace": ""}]
    }))
    .with(Instruction::value(RELEASE_NAMESPACE, "subjects.0.namespace"))
}

fn namespaced(mut object: TemplateObject) -> TemplateObject {
    object.set(&["metadata", "namespace"], JsonValue::String(String::new()));
    object.with(Instruction::value("ns | tojson", "metadata.namespace"))
}

fn file_name(set: &str, service_account: &str) -> String {
    format!("templates/{}.{}-{}.yaml", RBAC_GROUP, set, service_account)
}

/// Permission sets grouped by the service account they are bound to, in CSV order
///
/// A CSV may list several sets for one account; they share a template file.
fn by_service_account(
    sets: &[StrategyDeploymentPermissions],
) -> Vec<(&str, Vec<&StrategyDeploymentPermissions>)> {
    let mut grouped: Vec<(&str, Vec<_>)> = Vec::new();
    for permissions in sets {
        let account = permissions.service_account_name.as_str();
        match grouped.iter_mut().find(|(name, _)| *name == account) {
            Some((_, group)) => group.push(permissions),
            None => grouped.push((account, vec![permissions])),
        }
    }
    grouped
}

/// Templates for `permissions`, promoted to cluster scope at render time
pub fn permissions_files(csv: &ClusterServiceVersion) -> Result<Vec<TemplateFile>> {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for (account, sets) in by_service_account(&csv.spec.install.spec.permissions) {
        match permissions_file(csv.name(), account, &sets) {
            Ok(file) => files.push(file),
            Err(e) => errors.push(e),
        }
    }
    ConvertError::collect(errors)?;
    Ok(files)
}

fn permissions_file(
    csv_name: &str,
    account: &str,
    sets: &[&StrategyDeploymentPermissions],
) -> Result<TemplateFile> {
    let mut cluster_scoped = Vec::with_capacity(sets.len());
    let mut namespace_scoped = Vec::with_capacity(sets.len());
    for permissions in sets {
        let name = role_name(csv_name, permissions)?;
        let rules = rules(permissions)?;

        let cluster_role = role("ClusterRole", &name, rules.clone()).render()?;
        let cluster_binding = binding("ClusterRoleBinding", "ClusterRole", &name, account).render()?;
        let namespaced_role = namespaced(role("Role", &name, rules)).render()?;
        let namespaced_binding = namespaced(binding("RoleBinding", "Role", &name, account)).render()?;

        cluster_scoped.push(format!("{}---\n{}", cluster_role, cluster_binding));
        namespace_scoped.push(format!("{}---\n{}", namespaced_role, namespaced_binding));
        tracing::debug!(service_account = %account, role = %name, "generated permissions template");
    }

    let content = format!(
        concat!(
            "{import}",
            "{{%- set target = {target} %}}\n",
            "{{%- if target == \"\" %}}\n",
            "{cluster_scoped}",
            "{{%- else %}}\n",
            "{{%- for ns in target | splitlist(\",\") %}}\n",
            "---\n",
            "{namespace_scoped}",
            "{{%- endfor %}}\n",
            "{{%- endif %}}\n",
        ),
        import = import(TARGET_NAMESPACES_TPL, &[TARGET_NAMESPACES]),
        target = TARGET_NAMESPACES_EXPR,
        cluster_scoped = cluster_scoped.join("---\n"),
        namespace_scoped = namespace_scoped.join("---\n"),
    );

    Ok(TemplateFile::new(file_name("permissions", account), content))
}

/// Templates for `clusterPermissions`, always cluster scoped
pub fn cluster_permissions_files(csv: &ClusterServiceVersion) -> Result<Vec<TemplateFile>> {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for (account, sets) in by_service_account(&csv.spec.install.spec.cluster_permissions) {
        let documents: Result<Vec<String>> = sets
            .iter()
            .map(|permissions| {
                let name = role_name(csv.name(), permissions)?;
                let cluster_role = role("ClusterRole", &name, rules(permissions)?).render()?;
                let cluster_binding =
                    binding("ClusterRoleBinding", "ClusterRole", &name, account).render()?;
                Ok(format!("{}---\n{}", cluster_role, cluster_binding))
            })
            .collect();
        match documents {
            Ok(documents) => files.push(TemplateFile::new(
                file_name("clusterPermissions", account),
                documents.join("---\n"),
            )),
            Err(e) => errors.push(e),
        }
    }
    ConvertError::collect(errors)?;
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv() -> ClusterServiceVersion {
        serde_yaml::from_str(
            r#"
metadata:
  name: etcdoperator.v0.9.4
spec:
  install:
    strategy: deployment
    spec:
      permissions:
      - serviceAccountName: etcd-operator
        rules:
        - apiGroups: [etcd.database.coreos.com]
          resources: [etcdclusters]
          verbs: ["*"]
        - apiGroups: [""]
          resources: [pods]
          verbs: [get, list]
      - serviceAccountName: default
        rules: []
      clusterPermissions:
      - serviceAccountName: etcd-operator
        rules:
        - apiGroups: [""]
          resources: [nodes]
          verbs: [get]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_service_accounts_skip_default() {
        let files = service_account_files(&csv()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "templates/core.ServiceAccount-etcd-operator.yaml");
    }

    #[test]
    fn test_role_name_ignores_rule_order() {
        let csv = csv();
        let permissions = &csv.spec.install.spec.permissions[0];
        let mut reversed = permissions.clone();
        reversed.rules.reverse();

        assert_eq!(
            role_name(csv.name(), permissions).unwrap(),
            role_name(csv.name(), &reversed).unwrap()
        );
        assert_ne!(
            role_name(csv.name(), permissions).unwrap(),
            role_name(csv.name(), &csv.spec.install.spec.cluster_permissions[0]).unwrap()
        );
    }

    #[test]
    fn test_permissions_file_layout() {
        let files = permissions_files(&csv()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(
            files[0].path,
            "templates/rbac.authorization.k8s.io.permissions-etcd-operator.yaml"
        );

        let content = &files[0].content;
        assert!(content.starts_with(
            "{%- from \"_helpers.target_namespaces.tpl\" import target_namespaces %}\n"
        ));
        assert!(content.contains("{%- for ns in target | splitlist(\",\") %}"));
        assert!(content.contains("  namespace: {{ ns | tojson }}"));
        assert!(content.contains("  namespace: {{ release.namespace | tojson }}"));
    }

    #[test]
    fn test_cluster_permissions_file() {
        let files = cluster_permissions_files(&csv()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0].path,
            "templates/rbac.authorization.k8s.io.clusterPermissions-etcd-operator.yaml"
        );
        assert!(files[0].content.contains("kind: ClusterRoleBinding"));
        assert!(!files[0].content.contains("kind: Role\n"));
    }

    #[test]
    fn test_sets_for_one_account_share_a_file() {
        let mut csv = csv();
        let strategy = &mut csv.spec.install.spec;
        let mut narrower = strategy.permissions[0].clone();
        narrower.rules.truncate(1);
        strategy.permissions.push(narrower.clone());
        strategy.cluster_permissions.push(narrower.clone());

        let first = role_name(csv.name(), &csv.spec.install.spec.permissions[0]).unwrap();
        let second = role_name(csv.name(), &narrower).unwrap();
        assert_ne!(first, second);

        let files = permissions_files(&csv).unwrap();
        assert_eq!(files.len(), 2);
        let content = &files[0].content;
        assert_eq!(
            files[0].path,
            "templates/rbac.authorization.k8s.io.permissions-etcd-operator.yaml"
        );
        assert_eq!(content.matches("{%- if target").count(), 1);
        assert_eq!(content.matches("\nkind: ClusterRole\n").count(), 2);
        assert_eq!(content.matches("\nkind: Role\n").count(), 2);
        assert!(content.contains(&format!("name: {}", first)));
        assert!(content.contains(&format!("name: {}", second)));

        let files = cluster_permissions_files(&csv).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content.matches("kind: ClusterRoleBinding").count(), 2);
    }
}
