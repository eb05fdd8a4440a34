/// Startup plan
///
/// The startup order is a static table of groups. A plan is the table walked
/// in order, keeping the groups enabled in `services_to_run`, with every
/// service key resolved to its descriptor before anything starts.
///
/// ```text
/// keycloak        run keycloakdb, wait postgres, run keycloak
/// webapp          run webapp
/// webapp_build    run webapp_build [, webapp_android_build]
/// nextcloud       run nextcloud_db, wait postgres, run nextcloud_redis,
///                 run nextcloud_app, wait tcp :80
/// ...
/// opentdf         run opentdfdb, wait postgres, run opentdf
/// ```

use std::fmt;

use crate::error::{DeployError, DeployResult};
use crate::readiness::ReadinessProbe;
use crate::stack::{ServiceDescriptor, StackConfig};

/// One entry of a group's step list; service names are keys into `services`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTemplate {
    Run(&'static str),
    /// Runs only when modifier group `when` is enabled as well
    RunIf {
        service: &'static str,
        when: &'static str,
    },
    WaitPostgres(&'static str, u16),
    WaitTcp(&'static str, u16),
    WaitMongo(&'static str, u16),
    /// Pulls `models_to_pull` inside the service's container
    PullModels(&'static str),
}

#[derive(Debug)]
pub struct Group {
    pub key: &'static str,
    pub steps: &'static [StepTemplate],
}

impl Group {
    /// Service keys this group runs, in start order
    pub fn services(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.steps.iter().filter_map(|step| match step {
            StepTemplate::Run(service) | StepTemplate::RunIf { service, .. } => Some(*service),
            _ => None,
        })
    }
}

use StepTemplate::{PullModels, Run, RunIf, WaitMongo, WaitPostgres, WaitTcp};

/// Every group, in startup order
pub const GROUPS: &[Group] = &[
    Group {
        key: "keycloak",
        steps: &[Run("keycloakdb"), WaitPostgres("keycloakdb", 5432), Run("keycloak")],
    },
    Group {
        key: "webapp",
        steps: &[Run("webapp")],
    },
    Group {
        key: "webapp_build",
        steps: &[
            Run("webapp_build"),
            RunIf {
                service: "webapp_android_build",
                when: "webapp_android_build",
            },
        ],
    },
    Group {
        key: "nextcloud",
        steps: &[
            Run("nextcloud_db"),
            WaitPostgres("nextcloud_db", 5432),
            Run("nextcloud_redis"),
            Run("nextcloud_app"),
            WaitTcp("nextcloud_app", 80),
        ],
    },
    Group {
        key: "org",
        steps: &[Run("org")],
    },
    Group {
        key: "synapse",
        steps: &[Run("synapsedb"), WaitPostgres("synapsedb", 5432), Run("synapse")],
    },
    Group {
        key: "element",
        steps: &[Run("element")],
    },
    Group {
        key: "ollama",
        steps: &[Run("ollama"), PullModels("ollama")],
    },
    Group {
        key: "deepseekjanus",
        steps: &[Run("deepseek_janus")],
    },
    Group {
        key: "bluesky",
        steps: &[Run("bluesky"), Run("bluesky_bridge"), Run("bsky_fyp")],
    },
    Group {
        key: "sglang",
        steps: &[Run("sglang")],
    },
    Group {
        key: "gitea",
        steps: &[Run("gitea")],
    },
    Group {
        key: "whisper",
        steps: &[Run("whisper")],
    },
    Group {
        key: "mongo",
        steps: &[
            Run("mongo_db"),
            WaitMongo("mongo_db", 27017),
            Run("mongo_api"),
            Run("mongo_studio"),
        ],
    },
    Group {
        key: "libretranslate",
        steps: &[Run("libretranslate")],
    },
    Group {
        key: "users",
        steps: &[Run("usersdb"), Run("redis"), Run("users_api")],
    },
    Group {
        key: "ballot",
        steps: &[Run("ballot_redis"), Run("ballot_backend")],
    },
    Group {
        key: "iroh",
        steps: &[Run("iroh")],
    },
    Group {
        key: "nginx",
        steps: &[Run("nginx")],
    },
    Group {
        key: "opentdf",
        steps: &[Run("opentdfdb"), WaitPostgres("opentdfdb", 5432), Run("opentdf")],
    },
];

/// Keys that only change what another group does
pub const MODIFIERS: &[&str] = &["webapp_android_build"];

pub fn group(key: &str) -> Option<&'static Group> {
    GROUPS.iter().find(|g| g.key == key)
}

/// A resolved step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Run {
        group: &'static str,
        service: ServiceDescriptor,
    },
    Wait {
        group: &'static str,
        probe: ReadinessProbe,
    },
    PullModels {
        group: &'static str,
        container: String,
        models: Vec<String>,
    },
}

impl Step {
    pub fn group(&self) -> &'static str {
        match self {
            Step::Run { group, .. } | Step::Wait { group, .. } | Step::PullModels { group, .. } => {
                *group
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Run { service, .. } => write!(f, "run {} ({})", service.name, service.image),
            Step::Wait { probe, .. } => write!(f, "wait {}", probe),
            Step::PullModels {
                container, models, ..
            } => write!(f, "pull {} in {}", models.join(", "), container),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<Step>,
    /// Enabled groups, in startup order
    pub groups: Vec<&'static str>,
    /// Keys in `services_to_run` that name no group
    pub unknown: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Resolves the enabled groups of `stack` into an ordered list of steps
///
/// # Errors
///
/// Returns `MissingService` if an enabled group needs a service key that is
/// not defined under `services`.
pub fn build_plan(stack: &StackConfig) -> DeployResult<Plan> {
    let unknown: Vec<String> = stack
        .services_to_run
        .iter()
        .filter(|key| group(key).is_none() && !MODIFIERS.contains(&key.as_str()))
        .cloned()
        .collect();
    for key in &unknown {
        tracing::warn!(group = %key, "Unknown group in services_to_run, ignoring");
    }

    let mut plan = Plan {
        unknown,
        ..Default::default()
    };

    for group in GROUPS.iter().filter(|g| stack.enabled(g.key)) {
        plan.groups.push(group.key);

        for template in group.steps {
            let step = match *template {
                Run(service) => Step::Run {
                    group: group.key,
                    service: lookup(stack, group.key, service)?.clone(),
                },
                RunIf { service, when } => {
                    if !stack.enabled(when) {
                        continue;
                    }
                    Step::Run {
                        group: group.key,
                        service: lookup(stack, group.key, service)?.clone(),
                    }
                }
                WaitPostgres(service, port) => Step::Wait {
                    group: group.key,
                    probe: ReadinessProbe::Postgres {
                        host: lookup(stack, group.key, service)?.name.clone(),
                        port,
                    },
                },
                WaitTcp(service, port) => Step::Wait {
                    group: group.key,
                    probe: ReadinessProbe::Tcp {
                        host: lookup(stack, group.key, service)?.name.clone(),
                        port,
                    },
                },
                WaitMongo(service, port) => Step::Wait {
                    group: group.key,
                    probe: ReadinessProbe::Mongo {
                        host: lookup(stack, group.key, service)?.name.clone(),
                        port,
                    },
                },
                PullModels(service) => {
                    if stack.models_to_pull.is_empty() {
                        continue;
                    }
                    Step::PullModels {
                        group: group.key,
                        container: lookup(stack, group.key, service)?.name.clone(),
                        models: stack.models_to_pull.clone(),
                    }
                }
            };
            plan.steps.push(step);
        }
    }

    Ok(plan)
}

fn lookup<'a>(
    stack: &'a StackConfig,
    group: &str,
    service: &str,
) -> DeployResult<&'a ServiceDescriptor> {
    stack
        .service(service)
        .ok_or_else(|| DeployError::MissingService {
            group: group.to_string(),
            service: service.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_with(groups: &[&str]) -> StackConfig {
        let mut stack = StackConfig::from_toml("").unwrap();
        stack.services_to_run = groups.iter().map(|g| g.to_string()).collect();
        for group in GROUPS {
            for service in group.services() {
                let name = service.replace('_', "-");
                stack
                    .services
                    .insert(service.to_string(), ServiceDescriptor::new(name, "img"));
            }
        }
        stack
    }

    fn rendered(plan: &Plan) -> Vec<String> {
        plan.steps.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_table_order_wins_over_list_order() {
        let plan = build_plan(&stack_with(&["opentdf", "users", "keycloak"])).unwrap();
        assert_eq!(plan.groups, vec!["keycloak", "users", "opentdf"]);
        assert_eq!(
            rendered(&plan),
            vec![
                "run keycloakdb (img)",
                "wait postgres keycloakdb:5432",
                "run keycloak (img)",
                "run usersdb (img)",
                "run redis (img)",
                "run users-api (img)",
                "run opentdfdb (img)",
                "wait postgres opentdfdb:5432",
                "run opentdf (img)",
            ]
        );
    }

    #[test]
    fn test_nextcloud_waits_on_container_names() {
        let plan = build_plan(&stack_with(&["nextcloud"])).unwrap();
        assert_eq!(
            rendered(&plan),
            vec![
                "run nextcloud-db (img)",
                "wait postgres nextcloud-db:5432",
                "run nextcloud-redis (img)",
                "run nextcloud-app (img)",
                "wait tcp nextcloud-app:80",
            ]
        );
    }

    #[test]
    fn test_android_build_is_a_modifier() {
        let plan = build_plan(&stack_with(&["webapp_build"])).unwrap();
        assert_eq!(plan.steps.len(), 1);

        let plan = build_plan(&stack_with(&["webapp_android_build", "webapp_build"])).unwrap();
        assert_eq!(
            rendered(&plan),
            vec!["run webapp-build (img)", "run webapp-android-build (img)"]
        );
        assert!(plan.unknown.is_empty());

        let plan = build_plan(&stack_with(&["webapp_android_build"])).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_missing_descriptor_fails_before_anything() {
        let mut stack = stack_with(&["keycloak", "mongo"]);
        stack.services.remove("mongo_studio");
        let err = build_plan(&stack).unwrap_err();
        match err {
            DeployError::MissingService { group, service } => {
                assert_eq!(group, "mongo");
                assert_eq!(service, "mongo_studio");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_groups_are_ignored() {
        let plan = build_plan(&stack_with(&["whisper", "frobnicator"])).unwrap();
        assert_eq!(plan.groups, vec!["whisper"]);
        assert_eq!(plan.unknown, vec!["frobnicator"]);
    }

    #[test]
    fn test_model_pull_only_with_models() {
        let mut stack = stack_with(&["ollama"]);
        assert_eq!(build_plan(&stack).unwrap().steps.len(), 1);

        stack.models_to_pull = vec!["llama3".to_string(), "mistral".to_string()];
        let plan = build_plan(&stack).unwrap();
        assert_eq!(plan.steps[1].to_string(), "pull llama3, mistral in ollama");
        assert_eq!(plan.steps[1].group(), "ollama");
    }

    #[test]
    fn test_table_has_twenty_groups() {
        let keys: Vec<&str> = GROUPS.iter().map(|g| g.key).collect();
        assert_eq!(keys.len(), 20);
        assert_eq!(keys.first(), Some(&"keycloak"));
        assert_eq!(keys.last(), Some(&"opentdf"));
        assert!(group("nginx").is_some());
        assert!(group("webapp_android_build").is_none());
    }
}
