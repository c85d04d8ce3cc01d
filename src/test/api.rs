#[cfg(test)]
mod tests {
    use crate::api::SchoolView;
    use crate::auth::Role;
    use crate::models::{Contribution, UnifiedNotes};
    use crate::test::test_app::{TestAppBuilder, create_standard_test_app};
    use crate::test::test_utils::{data_as, send_json, setup_test_client};
    use rocket::http::{Method, Status};
    use rocket::local::asynchronous::Client;
    use rocket::tokio;
    use serde_json::{Value, json};

    /// Creates subject, course and chapter as `teacher` and returns the chapter id.
    async fn create_chapter(client: &Client, teacher: &str, school_id: &str) -> String {
        let (status, body) = send_json(
            client,
            Method::Post,
            &format!("/api/schools/{}/subjects", school_id),
            Some(teacher),
            Some(json!({ "name": "Math", "color": "#3B82F6" })),
        )
        .await;
        assert_eq!(status, Status::Created, "Subject creation failed: {}", body);
        let subject_id = body["data"]["id"].as_str().unwrap_or_default().to_string();

        let (status, body) = send_json(
            client,
            Method::Post,
            &format!("/api/forum/subjects/{}/courses", subject_id),
            Some(teacher),
            Some(json!({ "code": "MATH200", "title": "Calculus", "term": "Spring" })),
        )
        .await;
        assert_eq!(status, Status::Created, "Course creation failed: {}", body);
        let course_id = body["data"]["id"].as_str().unwrap_or_default().to_string();

        let (status, body) = send_json(
            client,
            Method::Post,
            &format!("/api/forum/courses/{}/chapters", course_id),
            Some(teacher),
            Some(json!({ "label": "Ch 2", "title": "Limits" })),
        )
        .await;
        assert_eq!(status, Status::Created, "Chapter creation failed: {}", body);
        assert_eq!(body["data"]["status"], "collecting");

        body["data"]["id"].as_str().unwrap_or_default().to_string()
    }

    async fn contribute(client: &Client, user: &str, chapter_id: &str, title: &str) -> Value {
        let (status, body) = send_json(
            client,
            Method::Post,
            &format!("/api/forum/chapters/{}/contributions", chapter_id),
            Some(user),
            Some(json!({
                "type": "takeaway",
                "title": title,
                "content": "A limit describes where f(x) heads as x approaches a"
            })),
        )
        .await;
        assert_eq!(status, Status::Created, "Contribution failed: {}", body);
        body
    }

    #[rocket::async_test]
    async fn test_health() {
        let app = create_standard_test_app().await;
        let client = setup_test_client(&app).await;

        let (status, body) = send_json(&client, Method::Get, "/api/health", None, None).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body, json!({ "data": "ok" }));
    }

    #[rocket::async_test]
    async fn test_undecodable_bodies_are_validation_errors() {
        let app = create_standard_test_app().await;
        let client = setup_test_client(&app).await;
        let school_id = app.school_id("Springfield High");

        let (status, body) = send_json(
            &client,
            Method::Put,
            &format!("/api/schools/{}/settings", school_id),
            Some("admin_user"),
            Some(json!({ "minContributions": -1, "studentCooldownHours": 2 })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
        let message = body["error"].as_str().unwrap_or_default();
        assert!(message.starts_with("Invalid request body"), "{}", message);
        assert!(message.contains("-1"), "{}", message);

        let (status, body) = send_json(
            &client,
            Method::Post,
            &format!("/api/schools/{}/subjects", school_id),
            Some("teacher_user"),
            Some(json!({ "name": "Math" })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
        let message = body["error"].as_str().unwrap_or_default();
        assert!(message.contains("missing field `color`"), "{}", message);

        let (status, _) = send_json(
            &client,
            Method::Put,
            &format!("/api/schools/{}/members/student_user", school_id),
            Some("admin_user"),
            Some(json!({ "role": "principal" })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);

        let chapter_id = create_chapter(&client, "teacher_user", &school_id).await;
        let (status, _) = send_json(
            &client,
            Method::Put,
            &format!("/api/forum/chapters/{}/status", chapter_id),
            Some("teacher_user"),
            Some(json!({ "status": "archived" })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);

        let settings = send_json(
            &client,
            Method::Get,
            &format!("/api/schools/{}/settings", school_id),
            Some("admin_user"),
            None,
        )
        .await;
        assert_eq!(settings.0, Status::Ok);
        assert_eq!(settings.1["data"]["minContributions"], 5);
    }

    #[rocket::async_test]
    async fn test_auth_required_apis() {
        let app = create_standard_test_app().await;
        let client = setup_test_client(&app).await;
        let school_id = app.school_id("Springfield High");

        let endpoints = vec![
            "/api/schools".to_string(),
            format!("/api/schools/{}", school_id),
            format!("/api/schools/{}/subjects", school_id),
            "/api/forum/chapters/any/contributions".to_string(),
        ];

        for endpoint in endpoints {
            let (status, body) = send_json(&client, Method::Get, &endpoint, None, None).await;
            assert_eq!(
                status,
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
            assert_eq!(body["error"], "Authentication required");
        }
    }

    #[rocket::async_test]
    async fn test_create_and_join_school() {
        let app = TestAppBuilder::new()
            .user("founder", Some("Founder"))
            .user("newcomer", None)
            .build()
            .await
            .expect("Failed to build test app");
        let client = setup_test_client(&app).await;

        let (status, body) = send_json(
            &client,
            Method::Post,
            "/api/schools",
            Some("founder"),
            Some(json!({ "name": "Riverdale", "description": "Go Bulldogs" })),
        )
        .await;
        assert_eq!(status, Status::Created);
        let created: SchoolView = data_as(&body);
        assert_eq!(created.role, Role::Admin);
        let join_key = created.join_key.expect("Admins see the join key");
        assert_eq!(join_key.len(), 6);

        let (status, body) = send_json(
            &client,
            Method::Post,
            "/api/schools/join",
            Some("newcomer"),
            Some(json!({ "joinKey": join_key.to_lowercase() })),
        )
        .await;
        assert_eq!(status, Status::Ok);
        let joined: SchoolView = data_as(&body);
        assert_eq!(joined.id, created.id);
        assert_eq!(joined.role, Role::Student);
        assert_eq!(joined.join_key, None);

        let (status, body) = send_json(
            &client,
            Method::Post,
            "/api/schools/join",
            Some("newcomer"),
            Some(json!({ "joinKey": join_key })),
        )
        .await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(body["error"], "You are already a member of this school");

        let (status, _) = send_json(
            &client,
            Method::Post,
            "/api/schools/join",
            Some("newcomer"),
            Some(json!({ "joinKey": "ZZZZZZ" })),
        )
        .await;
        assert_eq!(status, Status::NotFound);

        let (status, _) = send_json(
            &client,
            Method::Post,
            "/api/schools/join",
            Some("newcomer"),
            Some(json!({ "joinKey": "bad" })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);

        let (status, body) =
            send_json(&client, Method::Get, "/api/schools", Some("newcomer"), None).await;
        assert_eq!(status, Status::Ok);
        let schools: Vec<SchoolView> = data_as(&body);
        assert_eq!(schools.len(), 1);
        assert_eq!(schools[0].name, "Riverdale");
    }

    #[rocket::async_test]
    async fn test_non_members_are_refused() {
        let app = TestAppBuilder::new()
            .school("Springfield High", "SPRING", "admin_user")
            .build()
            .await
            .expect("Failed to build test app");
        let client = setup_test_client(&app).await;
        let school_id = app.school_id("Springfield High");

        let (status, body) = send_json(
            &client,
            Method::Get,
            &format!("/api/schools/{}", school_id),
            Some("outsider"),
            None,
        )
        .await;
        assert_eq!(status, Status::Forbidden);
        assert_eq!(body["error"], "You are not a member of this school");
    }

    #[rocket::async_test]
    async fn test_catalog_permissions_and_validation() {
        let app = create_standard_test_app().await;
        let client = setup_test_client(&app).await;
        let school_id = app.school_id("Springfield High");
        let uri = format!("/api/schools/{}/subjects", school_id);

        let (status, body) = send_json(
            &client,
            Method::Post,
            &uri,
            Some("student_user"),
            Some(json!({ "name": "Math", "color": "#3B82F6" })),
        )
        .await;
        assert_eq!(status, Status::Forbidden);
        assert_eq!(body["error"], "You don't have permission to perform this action");

        let (status, body) = send_json(
            &client,
            Method::Post,
            &uri,
            Some("teacher_user"),
            Some(json!({ "name": "Math", "color": "blue" })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["error"], "Color must be a hex code like #3B82F6");

        let (status, body) = send_json(
            &client,
            Method::Post,
            &uri,
            Some("teacher_user"),
            Some(json!({ "name": "Math", "color": "#3B82F6" })),
        )
        .await;
        assert_eq!(status, Status::Created);
        assert_eq!(body["data"]["colorTag"], "#3B82F6");
        assert_eq!(body["data"]["schoolId"], school_id.as_str());

        let (status, body) = send_json(&client, Method::Get, &uri, Some("student_user"), None).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["data"][0]["name"], "Math");
    }

    #[rocket::async_test]
    async fn test_concurrent_generations_get_distinct_versions() {
        let app = create_standard_test_app().await;
        let client = setup_test_client(&app).await;
        let school_id = app.school_id("Springfield High");
        let chapter_id = create_chapter(&client, "teacher_user", &school_id).await;
        let generate_uri = format!("/api/forum/chapters/{}/generate", chapter_id);

        for i in 0..5 {
            contribute(&client, "student_user", &chapter_id, &format!("Fact {}", i)).await;
        }

        let (first, second) = tokio::join!(
            send_json(&client, Method::Post, &generate_uri, Some("admin_user"), None),
            send_json(&client, Method::Post, &generate_uri, Some("admin_user"), None),
        );
        assert_eq!(first.0, Status::Created, "First generation failed: {}", first.1);
        assert_eq!(second.0, Status::Created, "Second generation failed: {}", second.1);

        let mut versions = vec![
            first.1["data"]["version"].as_u64(),
            second.1["data"]["version"].as_u64(),
        ];
        versions.sort();
        assert_eq!(versions, vec![Some(1), Some(2)]);

        let (status, body) = send_json(
            &client,
            Method::Get,
            &format!("/api/forum/chapters/{}/notes", chapter_id),
            Some("admin_user"),
            None,
        )
        .await;
        assert_eq!(status, Status::Ok);
        let listed: Vec<UnifiedNotes> = data_as(&body);
        let listed: Vec<u32> = listed.iter().map(|n| n.version).collect();
        assert_eq!(listed, vec![2, 1]);
    }

    #[rocket::async_test]
    async fn test_generation_flow() {
        let app = create_standard_test_app().await;
        let client = setup_test_client(&app).await;
        let school_id = app.school_id("Springfield High");
        let chapter_id = create_chapter(&client, "teacher_user", &school_id).await;
        let generate_uri = format!("/api/forum/chapters/{}/generate", chapter_id);

        let (status, body) =
            send_json(&client, Method::Post, &generate_uri, Some("student_user"), None).await;
        assert_eq!(status, Status::Forbidden);
        assert_eq!(body["error"], "Need 5 contributions");

        let (status, _) = send_json(
            &client,
            Method::Get,
            &format!("/api/forum/chapters/{}/notes/latest", chapter_id),
            Some("student_user"),
            None,
        )
        .await;
        assert_eq!(status, Status::NotFound);

        for i in 0..5 {
            let user = if i % 2 == 0 { "student_user" } else { "other_student" };
            contribute(&client, user, &chapter_id, &format!("Limit fact {}", i)).await;
        }

        let (status, body) = send_json(
            &client,
            Method::Get,
            &format!("/api/forum/chapters/{}", chapter_id),
            Some("student_user"),
            None,
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"]["status"], "ai_ready");
        assert_eq!(body["data"]["statusLabel"], "AI Ready");
        assert_eq!(body["data"]["contributionCount"], 5);

        let (status, body) =
            send_json(&client, Method::Post, &generate_uri, Some("student_user"), None).await;
        assert_eq!(status, Status::Created, "Generation failed: {}", body);
        let notes: UnifiedNotes = data_as(&body);
        assert_eq!(notes.version, 1);
        assert_eq!(notes.contribution_count, 5);
        assert_eq!(notes.generated_by.as_deref(), Some("student_user"));
        assert_eq!(notes.sections.key_concepts.len(), 5);

        let (status, body) = send_json(
            &client,
            Method::Get,
            &format!("/api/forum/chapters/{}/generation", chapter_id),
            Some("other_student"),
            None,
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"]["allowed"], false);
        assert_eq!(body["data"]["minContributions"], 5);
        assert_eq!(body["data"]["lastGeneration"]["role"], "student");
        let reason = body["data"]["reason"].as_str().unwrap_or_default();
        assert!(reason.contains("120min"), "Unexpected reason: {}", reason);

        let (status, body) =
            send_json(&client, Method::Post, &generate_uri, Some("other_student"), None).await;
        assert_eq!(status, Status::Forbidden);
        assert!(
            body["error"]
                .as_str()
                .unwrap_or_default()
                .starts_with("Please wait")
        );

        // Admins have no cooldown
        let (status, body) =
            send_json(&client, Method::Post, &generate_uri, Some("admin_user"), None).await;
        assert_eq!(status, Status::Created);
        assert_eq!(body["data"]["version"], 2);

        let (status, body) =
            send_json(&client, Method::Post, &generate_uri, Some("teacher_user"), None).await;
        assert_eq!(status, Status::Forbidden);
        assert_eq!(body["error"], "Please wait 30min before generating again");

        let (status, body) = send_json(
            &client,
            Method::Get,
            &format!("/api/forum/chapters/{}/notes", chapter_id),
            Some("student_user"),
            None,
        )
        .await;
        assert_eq!(status, Status::Ok);
        let versions: Vec<UnifiedNotes> = data_as(&body);
        let numbers: Vec<u32> = versions.iter().map(|n| n.version).collect();
        assert_eq!(numbers, vec![2, 1]);

        let (_, body) = send_json(
            &client,
            Method::Get,
            &format!("/api/forum/chapters/{}", chapter_id),
            Some("student_user"),
            None,
        )
        .await;
        assert_eq!(body["data"]["status"], "compiled");
    }

    #[rocket::async_test]
    async fn test_school_settings_change_threshold() {
        let app = TestAppBuilder::new()
            .school("Springfield High", "SPRING", "admin_user")
            .teacher("Springfield High", "teacher_user")
            .student("Springfield High", "student_user")
            .settings("Springfield High", 2, 0)
            .build()
            .await
            .expect("Failed to build test app");
        let client = setup_test_client(&app).await;
        let school_id = app.school_id("Springfield High");
        let settings_uri = format!("/api/schools/{}/settings", school_id);

        let (status, body) =
            send_json(&client, Method::Get, &settings_uri, Some("student_user"), None).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"], json!({ "minContributions": 2, "studentCooldownHours": 0 }));

        let (status, _) = send_json(
            &client,
            Method::Put,
            &settings_uri,
            Some("teacher_user"),
            Some(json!({ "minContributions": 3, "studentCooldownHours": 1 })),
        )
        .await;
        assert_eq!(status, Status::Forbidden);

        let (status, body) = send_json(
            &client,
            Method::Put,
            &settings_uri,
            Some("admin_user"),
            Some(json!({ "minContributions": 51, "studentCooldownHours": 1 })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["error"], "Minimum contributions must be between 1 and 50");

        let chapter_id = create_chapter(&client, "teacher_user", &school_id).await;
        contribute(&client, "student_user", &chapter_id, "First").await;
        contribute(&client, "student_user", &chapter_id, "Second").await;

        let generate_uri = format!("/api/forum/chapters/{}/generate", chapter_id);
        for expected_version in [1, 2] {
            let (status, body) =
                send_json(&client, Method::Post, &generate_uri, Some("student_user"), None).await;
            assert_eq!(status, Status::Created, "Generation failed: {}", body);
            assert_eq!(body["data"]["version"], expected_version);
        }

        let (status, _) = send_json(
            &client,
            Method::Put,
            &settings_uri,
            Some("admin_user"),
            Some(json!({ "minContributions": 3, "studentCooldownHours": 1 })),
        )
        .await;
        assert_eq!(status, Status::Ok);

        let (status, body) =
            send_json(&client, Method::Post, &generate_uri, Some("student_user"), None).await;
        assert_eq!(status, Status::Forbidden);
        assert_eq!(body["error"], "Need 3 contributions");
    }

    #[rocket::async_test]
    async fn test_member_management() {
        let app = create_standard_test_app().await;
        let client = setup_test_client(&app).await;
        let school_id = app.school_id("Springfield High");
        let members_uri = format!("/api/schools/{}/members", school_id);

        let (status, _) =
            send_json(&client, Method::Get, &members_uri, Some("student_user"), None).await;
        assert_eq!(status, Status::Forbidden);

        let (status, body) =
            send_json(&client, Method::Get, &members_uri, Some("teacher_user"), None).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(4));

        let (status, body) = send_json(
            &client,
            Method::Put,
            &format!("{}/admin_user", members_uri),
            Some("admin_user"),
            Some(json!({ "role": "teacher" })),
        )
        .await;
        assert_eq!(status, Status::Forbidden);
        assert_eq!(body["error"], "Admins cannot demote themselves");

        let (status, _) = send_json(
            &client,
            Method::Put,
            &format!("{}/student_user", members_uri),
            Some("teacher_user"),
            Some(json!({ "role": "admin" })),
        )
        .await;
        assert_eq!(status, Status::Forbidden);

        let (status, body) = send_json(
            &client,
            Method::Put,
            &format!("{}/student_user", members_uri),
            Some("admin_user"),
            Some(json!({ "role": "teacher" })),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"]["userId"], "student_user");
        assert_eq!(body["data"]["role"], "teacher");

        let (status, _) = send_json(
            &client,
            Method::Put,
            &format!("{}/nobody", members_uri),
            Some("admin_user"),
            Some(json!({ "role": "teacher" })),
        )
        .await;
        assert_eq!(status, Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_contribution_interactions_and_deletion() {
        let app = create_standard_test_app().await;
        let client = setup_test_client(&app).await;
        let school_id = app.school_id("Springfield High");
        let chapter_id = create_chapter(&client, "teacher_user", &school_id).await;

        let body = contribute(&client, "student_user", &chapter_id, "Squeeze theorem").await;
        let contribution: Contribution = data_as(&body);
        assert_eq!(contribution.author_name, "Student User");

        let (status, body) = send_json(
            &client,
            Method::Post,
            &format!("/api/forum/contributions/{}/helpful", contribution.id),
            Some("other_student"),
            None,
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"]["helpfulCount"], 1);

        let (status, body) = send_json(
            &client,
            Method::Post,
            &format!("/api/forum/contributions/{}/replies", contribution.id),
            Some("teacher_user"),
            Some(json!({ "content": "Nice one" })),
        )
        .await;
        assert_eq!(status, Status::Created);
        assert_eq!(body["data"]["authorName"], "Teacher User");

        let (status, _) = send_json(
            &client,
            Method::Post,
            &format!("/api/forum/contributions/{}/replies", contribution.id),
            Some("teacher_user"),
            Some(json!({ "content": "" })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);

        let (status, body) = send_json(
            &client,
            Method::Get,
            &format!("/api/forum/chapters/{}/contributions", chapter_id),
            Some("other_student"),
            None,
        )
        .await;
        assert_eq!(status, Status::Ok);
        let listed: Vec<Contribution> = data_as(&body);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].replies.len(), 1);
        assert_eq!(listed[0].helpful_count, 1);

        let delete_uri = format!("/api/forum/posts/{}", contribution.id);
        let (status, _) =
            send_json(&client, Method::Delete, &delete_uri, Some("other_student"), None).await;
        assert_eq!(status, Status::Forbidden);

        let (status, _) =
            send_json(&client, Method::Delete, &delete_uri, Some("student_user"), None).await;
        assert_eq!(status, Status::NoContent);

        let (status, _) =
            send_json(&client, Method::Delete, &delete_uri, Some("teacher_user"), None).await;
        assert_eq!(status, Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_forum_outage_returns_generic_error() {
        let app = create_standard_test_app().await;
        let client = setup_test_client(&app).await;
        let school_id = app.school_id("Springfield High");

        app.forum.set_offline(true);

        let (status, body) = send_json(
            &client,
            Method::Get,
            &format!("/api/schools/{}/subjects", school_id),
            Some("student_user"),
            None,
        )
        .await;
        assert_eq!(status, Status::InternalServerError);
        assert_eq!(body["error"], "Forum service unavailable");
    }
}
