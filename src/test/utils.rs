#[cfg(test)]
pub mod test_app {
    use crate::auth::{Role, SessionUser};
    use crate::database::{add_membership, init_schema, upsert_school_settings};
    use crate::env::AppConfig;
    use crate::error::AppError;
    use crate::forum::{ForumUser, InMemoryForum};
    use crate::gate::GateSettings;
    use crate::mapping::{ForumRepository, NewSchool};
    use crate::models::School;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashMap;
    use std::sync::{Arc, Once};

    static INIT: Once = Once::new();

    #[derive(Default)]
    pub struct TestAppBuilder {
        users: Vec<ForumUser>,
        schools: Vec<TestSchool>,
        members: Vec<TestMember>,
        settings: Vec<(String, GateSettings)>,
    }

    pub struct TestSchool {
        pub name: String,
        pub join_key: String,
        pub admin_id: String,
    }

    pub struct TestMember {
        pub school_name: String,
        pub user_id: String,
        pub role: Role,
    }

    impl TestAppBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(mut self, id: &str, display_name: Option<&str>) -> Self {
            self.users.push(ForumUser {
                id: id.to_string(),
                username: id.to_string(),
                display_name: display_name.map(String::from),
            });
            self
        }

        /// Adds a school created by `admin_id`, who becomes its admin.
        pub fn school(mut self, name: &str, join_key: &str, admin_id: &str) -> Self {
            self.schools.push(TestSchool {
                name: name.to_string(),
                join_key: join_key.to_string(),
                admin_id: admin_id.to_string(),
            });
            self
        }

        pub fn teacher(self, school_name: &str, user_id: &str) -> Self {
            self.member(school_name, user_id, Role::Teacher)
        }

        pub fn student(self, school_name: &str, user_id: &str) -> Self {
            self.member(school_name, user_id, Role::Student)
        }

        pub fn member(mut self, school_name: &str, user_id: &str, role: Role) -> Self {
            self.members.push(TestMember {
                school_name: school_name.to_string(),
                user_id: user_id.to_string(),
                role,
            });
            self
        }

        pub fn settings(mut self, school_name: &str, min: u32, cooldown_hours: u32) -> Self {
            let settings =
                GateSettings::new(min, cooldown_hours).expect("Test settings out of bounds");
            self.settings.push((school_name.to_string(), settings));
            self
        }

        pub async fn build(self) -> Result<TestApp, AppError> {
            INIT.call_once(|| {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter("debug")
                    .with_test_writer()
                    .try_init();
            });

            let pool = test_pool().await;

            let forum = Arc::new(InMemoryForum::new());
            for user in self.users {
                forum.insert_user(user);
            }
            let repository = ForumRepository::new(forum.clone());

            let mut schools = HashMap::new();
            for school in &self.schools {
                let creator = session_user(&school.admin_id);
                let created = repository
                    .create_school(
                        NewSchool {
                            name: school.name.clone(),
                            description: format!("{} test school", school.name),
                            join_key: Some(school.join_key.clone()),
                            is_demo: false,
                        },
                        &creator,
                    )
                    .await?;
                add_membership(&pool, &school.admin_id, &created.id, Role::Admin).await?;
                schools.insert(school.name.clone(), created);
            }

            for member in &self.members {
                let school = schools.get(&member.school_name).ok_or_else(|| {
                    AppError::NotFound(format!("Test school {} not found", member.school_name))
                })?;
                add_membership(&pool, &member.user_id, &school.id, member.role).await?;
            }

            for (school_name, settings) in &self.settings {
                let school = schools.get(school_name).ok_or_else(|| {
                    AppError::NotFound(format!("Test school {} not found", school_name))
                })?;
                upsert_school_settings(&pool, &school.id, settings).await?;
            }

            Ok(TestApp {
                pool,
                forum,
                repository,
                config: AppConfig::default(),
                schools,
            })
        }
    }

    pub struct TestApp {
        pub pool: SqlitePool,
        pub forum: Arc<InMemoryForum>,
        pub repository: ForumRepository,
        pub config: AppConfig,
        pub schools: HashMap<String, School>,
    }

    impl TestApp {
        pub fn school(&self, name: &str) -> &School {
            self.schools
                .get(name)
                .unwrap_or_else(|| panic!("Test school {} not found", name))
        }

        pub fn school_id(&self, name: &str) -> String {
            self.school(name).id.clone()
        }
    }

    /// A single-connection in-memory database so every query sees the same data.
    pub async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");
        init_schema(&pool).await.expect("Failed to apply schema");
        pool
    }

    pub fn session_user(id: &str) -> SessionUser {
        SessionUser {
            id: id.to_string(),
            username: id.to_string(),
        }
    }

    /// A school with an admin, a teacher and two students.
    pub async fn create_standard_test_app() -> TestApp {
        TestAppBuilder::new()
            .user("admin_user", Some("Admin User"))
            .user("teacher_user", Some("Teacher User"))
            .user("student_user", Some("Student User"))
            .user("other_student", None)
            .school("Springfield High", "SPRING", "admin_user")
            .teacher("Springfield High", "teacher_user")
            .student("Springfield High", "student_user")
            .student("Springfield High", "other_student")
            .build()
            .await
            .expect("Failed to build test app")
    }
}

#[cfg(test)]
pub mod test_utils {
    use crate::auth::USER_ID_COOKIE;
    use crate::init_rocket;
    use crate::test::test_app::TestApp;
    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::Client;
    use serde::de::DeserializeOwned;
    use serde_json::Value;

    pub async fn setup_test_client(app: &TestApp) -> Client {
        let rocket = init_rocket(
            app.pool.clone(),
            app.repository.clone(),
            app.config.clone(),
        )
        .await;

        Client::tracked(rocket)
            .await
            .expect("Failed to create Rocket client")
    }

    pub fn session_cookie(user_id: &str) -> Cookie<'static> {
        Cookie::new(USER_ID_COOKIE, user_id.to_string())
    }

    /// Sends a request as `user_id` and returns the status with the parsed body.
    pub async fn send_json(
        client: &Client,
        method: rocket::http::Method,
        uri: &str,
        user_id: Option<&str>,
        body: Option<Value>,
    ) -> (Status, Value) {
        let mut request = client.req(method, uri);
        if let Some(user_id) = user_id {
            request = request.private_cookie(session_cookie(user_id));
        }
        if let Some(body) = body {
            request = request.header(ContentType::JSON).body(body.to_string());
        }

        let response = request.dispatch().await;
        let status = response.status();
        let text = response.into_string().await.unwrap_or_default();
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        (status, value)
    }

    pub fn data_as<T: DeserializeOwned>(body: &Value) -> T {
        serde_json::from_value(body["data"].clone()).expect("Response data did not decode")
    }
}
