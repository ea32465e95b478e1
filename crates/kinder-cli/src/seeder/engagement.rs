//! Demo activities, enrollment plans, applications and notifications.
//!
//! Rows are owned by the `demo_<role>` accounts, so `seed-demo-users` must
//! run first. Each row is matched on a natural key (title, or phone for
//! applications) and skipped when present, which makes re-runs no-ops.

use kinder_core::{OpsError, RoleCode};
use kinder_models::UserId;
use sqlx::{MySqlConnection, MySqlPool};
use std::fmt;
use std::time::Instant;
use tracing::{debug, instrument};

use super::users::{demo_user, user_id_by_username};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivitySeed {
    pub title: &'static str,
    pub description: &'static str,
    /// 1 = sports, 2 = arts, 3 = science, 4 = outing.
    pub activity_type: i32,
    /// 1 = open, 2 = registering, 3 = running, 4 = finished.
    pub status: i32,
    pub start_time: &'static str,
    pub end_time: &'static str,
    pub location: &'static str,
    pub capacity: i32,
    pub registration_start: &'static str,
    pub registration_end: &'static str,
    pub fee: f64,
    pub needs_approval: bool,
}

pub const ACTIVITIES: [ActivitySeed; 4] = [
    ActivitySeed {
        title: "Autumn Family Sports Day",
        description: "Relay races and team games for children and parents on the main playground.",
        activity_type: 1,
        status: 2,
        start_time: "2024-10-26 09:00:00",
        end_time: "2024-10-26 11:30:00",
        location: "Playground and gym",
        capacity: 200,
        registration_start: "2024-10-01 00:00:00",
        registration_end: "2024-10-20 23:59:59",
        fee: 0.0,
        needs_approval: false,
    },
    ActivitySeed {
        title: "Fifth Annual Arts Festival",
        description: "Songs, dances and drawings prepared by every class, performed for families.",
        activity_type: 2,
        status: 1,
        start_time: "2024-12-15 15:00:00",
        end_time: "2024-12-15 17:00:00",
        location: "Multi-purpose hall",
        capacity: 300,
        registration_start: "2024-11-15 00:00:00",
        registration_end: "2024-12-10 23:59:59",
        fee: 0.0,
        needs_approval: false,
    },
    ActivitySeed {
        title: "Science Discovery Week",
        description: "Hands-on experiments with magnets, water and light across five mornings.",
        activity_type: 3,
        status: 3,
        start_time: "2024-11-04 09:00:00",
        end_time: "2024-11-08 16:00:00",
        location: "Discovery classroom",
        capacity: 120,
        registration_start: "2024-10-20 00:00:00",
        registration_end: "2024-11-01 23:59:59",
        fee: 30.0,
        needs_approval: false,
    },
    ActivitySeed {
        title: "Spring Forest Park Outing",
        description: "A guided walk in the forest park to observe plants and insects in spring.",
        activity_type: 4,
        status: 1,
        start_time: "2025-04-12 08:30:00",
        end_time: "2025-04-12 15:00:00",
        location: "Olympic Forest Park",
        capacity: 150,
        registration_start: "2025-03-15 00:00:00",
        registration_end: "2025-04-08 23:59:59",
        fee: 80.0,
        needs_approval: true,
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrollmentPlanSeed {
    pub title: &'static str,
    pub year: i32,
    /// 1 = spring, 2 = autumn.
    pub semester: i32,
    pub start_date: &'static str,
    pub end_date: &'static str,
    pub target_count: i32,
    pub target_amount: f64,
    pub age_range: &'static str,
    pub requirements: &'static str,
    pub description: &'static str,
    /// 1 = published, 2 = in progress.
    pub status: i32,
    pub remark: &'static str,
}

pub const ENROLLMENT_PLANS: [EnrollmentPlanSeed; 2] = [
    EnrollmentPlanSeed {
        title: "2025 Spring Enrollment",
        year: 2025,
        semester: 1,
        start_date: "2025-01-15",
        end_date: "2025-03-31",
        target_count: 60,
        target_amount: 3800.0,
        age_range: "3-5",
        requirements: "Healthy children of a suitable age; families from the neighbourhood come first.",
        description: "Spring term intake focused on all-round development.",
        status: 2,
        remark: "Spring priority intake",
    },
    EnrollmentPlanSeed {
        title: "2025 Autumn Enrollment",
        year: 2025,
        semester: 2,
        start_date: "2025-05-01",
        end_date: "2025-08-31",
        target_count: 100,
        target_amount: 4200.0,
        age_range: "2.5-6",
        requirements: "Children of every age group; places in all grades.",
        description: "Main intake of the year across every grade.",
        status: 1,
        remark: "Main intake of the year",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationSeed {
    pub student_name: &'static str,
    pub gender: &'static str,
    pub birth_date: &'static str,
    /// `pending`, `reviewing` or `approved`.
    pub status: &'static str,
    pub apply_date: &'static str,
    /// Natural key; unique across the seed.
    pub contact_phone: &'static str,
    pub source: &'static str,
}

/// Filed by the demo parent against the first enrollment plan.
pub const APPLICATIONS: [ApplicationSeed; 3] = [
    ApplicationSeed {
        student_name: "Leo Carter",
        gender: "male",
        birth_date: "2021-06-15",
        status: "pending",
        apply_date: "2024-11-20 14:30:00",
        contact_phone: "13900010001",
        source: "Website",
    },
    ApplicationSeed {
        student_name: "Mia Carter",
        gender: "female",
        birth_date: "2020-09-08",
        status: "approved",
        apply_date: "2024-11-18 10:15:00",
        contact_phone: "13900010002",
        source: "Walk-in",
    },
    ApplicationSeed {
        student_name: "Noah Carter",
        gender: "male",
        birth_date: "2019-12-03",
        status: "reviewing",
        apply_date: "2024-11-22 16:45:00",
        contact_phone: "13900010003",
        source: "Social media",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationSeed {
    pub title: &'static str,
    pub content: &'static str,
    /// `activity`, `system` or `student`.
    pub kind: &'static str,
    pub recipient: RoleCode,
    pub read: bool,
}

pub const NOTIFICATIONS: [NotificationSeed; 3] = [
    NotificationSeed {
        title: "Autumn Family Sports Day",
        content: "The sports day is on the morning of October 26th. Please plan to join us.",
        kind: "activity",
        recipient: RoleCode::Principal,
        read: false,
    },
    NotificationSeed {
        title: "New student interviews",
        content: "Spring intake interviews run Wednesday to Friday next week.",
        kind: "system",
        recipient: RoleCode::Teacher,
        read: false,
    },
    NotificationSeed {
        title: "This week in class",
        content: "The children enjoyed the science activities. Keep encouraging their curiosity at home.",
        kind: "student",
        recipient: RoleCode::Parent,
        read: true,
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngagementReport {
    pub activities: usize,
    pub plans: usize,
    pub applications: usize,
    pub notifications: usize,
    /// Rows that were already present.
    pub skipped: usize,
}

impl fmt::Display for EngagementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "   ✓ {} activities, {} enrollment plans, {} applications, {} notifications ({} already present)",
            self.activities, self.plans, self.applications, self.notifications, self.skipped
        )
    }
}

async fn demo_account(conn: &mut MySqlConnection, role: RoleCode) -> Result<UserId, OpsError> {
    user_id_by_username(conn, &demo_user(role, "").username)
        .await
        .map_err(|e| match e {
            OpsError::MissingPrerequisite(_) => {
                OpsError::missing(format!("demo account for role '{}'; run seed-demo-users first", role))
            }
            other => other,
        })
}

async fn exists(conn: &mut MySqlConnection, sql: &str, key: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(sql).bind(key).fetch_one(&mut *conn).await?;
    Ok(count > 0)
}

/// Inserts the fixed activities, plans, applications and notifications.
#[instrument(skip_all)]
pub async fn seed_demo_engagement(pool: &MySqlPool) -> Result<EngagementReport, OpsError> {
    let start_time = Instant::now();
    println!("🎭 Seeding demo activities, enrollment and notifications...");

    let kindergarten_id = sqlx::query_scalar::<_, i64>("SELECT id FROM kindergartens ORDER BY id LIMIT 1")
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| OpsError::missing("no kindergarten row; create one before seeding demo data"))?;

    let mut tx = pool.begin().await?;
    let principal = demo_account(&mut tx, RoleCode::Principal).await?;
    let parent = demo_account(&mut tx, RoleCode::Parent).await?;
    let mut report = EngagementReport::default();

    for activity in &ACTIVITIES {
        if exists(&mut tx, "SELECT COUNT(*) FROM activities WHERE title = ?", activity.title).await? {
            report.skipped += 1;
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO activities (
                kindergarten_id, title, description, activity_type, status, start_time, end_time, location,
                capacity, registered_count, checked_in_count, fee, registration_start_time,
                registration_end_time, needs_approval, creator_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?, ?, ?, ?, NOW(), NOW())
            "#,
        )
        .bind(kindergarten_id)
        .bind(activity.title)
        .bind(activity.description)
        .bind(activity.activity_type)
        .bind(activity.status)
        .bind(activity.start_time)
        .bind(activity.end_time)
        .bind(activity.location)
        .bind(activity.capacity)
        .bind(activity.fee)
        .bind(activity.registration_start)
        .bind(activity.registration_end)
        .bind(activity.needs_approval)
        .bind(principal)
        .execute(&mut *tx)
        .await?;
        debug!(title = activity.title, "Activity created");
        report.activities += 1;
    }

    for plan in &ENROLLMENT_PLANS {
        if exists(&mut tx, "SELECT COUNT(*) FROM enrollment_plans WHERE title = ?", plan.title).await? {
            report.skipped += 1;
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO enrollment_plans (
                kindergarten_id, title, year, semester, start_date, end_date, target_count, target_amount,
                age_range, requirements, description, status, remark, creator_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NOW(), NOW())
            "#,
        )
        .bind(kindergarten_id)
        .bind(plan.title)
        .bind(plan.year)
        .bind(plan.semester)
        .bind(plan.start_date)
        .bind(plan.end_date)
        .bind(plan.target_count)
        .bind(plan.target_amount)
        .bind(plan.age_range)
        .bind(plan.requirements)
        .bind(plan.description)
        .bind(plan.status)
        .bind(plan.remark)
        .bind(principal)
        .execute(&mut *tx)
        .await?;
        report.plans += 1;
    }

    let plan_id: i64 = sqlx::query_scalar("SELECT id FROM enrollment_plans WHERE title = ?")
        .bind(ENROLLMENT_PLANS[0].title)
        .fetch_one(&mut *tx)
        .await?;
    for application in &APPLICATIONS {
        if exists(
            &mut tx,
            "SELECT COUNT(*) FROM enrollment_applications WHERE contact_phone = ?",
            application.contact_phone,
        )
        .await?
        {
            report.skipped += 1;
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO enrollment_applications (
                student_name, gender, birth_date, parent_id, plan_id, status, apply_date, contact_phone,
                application_source, created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NOW(), NOW())
            "#,
        )
        .bind(application.student_name)
        .bind(application.gender)
        .bind(application.birth_date)
        .bind(parent)
        .bind(plan_id)
        .bind(application.status)
        .bind(application.apply_date)
        .bind(application.contact_phone)
        .bind(application.source)
        .bind(parent)
        .execute(&mut *tx)
        .await?;
        report.applications += 1;
    }

    for notification in &NOTIFICATIONS {
        let recipient = demo_account(&mut tx, notification.recipient).await?;
        let present: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE title = ? AND user_id = ?")
            .bind(notification.title)
            .bind(recipient)
            .fetch_one(&mut *tx)
            .await?;
        if present > 0 {
            report.skipped += 1;
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO notifications (
                title, content, type, user_id, status, read_at, total_count, read_count, send_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, IF(?, NOW(), NULL), 1, ?, NOW(), NOW(), NOW())
            "#,
        )
        .bind(notification.title)
        .bind(notification.content)
        .bind(notification.kind)
        .bind(recipient)
        .bind(if notification.read { "read" } else { "unread" })
        .bind(notification.read)
        .bind(i32::from(notification.read))
        .execute(&mut *tx)
        .await?;
        report.notifications += 1;
    }

    tx.commit().await?;
    println!("{}", report);
    println!("   ✓ Done in {:?}", start_time.elapsed());
    Ok(report)
}

/// Removes what [`seed_demo_engagement`] inserted. Returns rows deleted.
#[instrument(skip_all)]
pub async fn clear_demo_engagement(pool: &MySqlPool) -> Result<u64, OpsError> {
    let mut tx = pool.begin().await?;
    let mut deleted = 0;

    for notification in &NOTIFICATIONS {
        deleted += sqlx::query(
            "DELETE FROM notifications WHERE title = ? AND user_id IN (SELECT id FROM users WHERE username = ?)",
        )
        .bind(notification.title)
        .bind(demo_user(notification.recipient, "").username)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    for application in &APPLICATIONS {
        deleted += sqlx::query("DELETE FROM enrollment_applications WHERE contact_phone = ?")
            .bind(application.contact_phone)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    for plan in &ENROLLMENT_PLANS {
        deleted += sqlx::query("DELETE FROM enrollment_plans WHERE title = ?")
            .bind(plan.title)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    for activity in &ACTIVITIES {
        deleted += sqlx::query("DELETE FROM activities WHERE title = ?")
            .bind(activity.title)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    tx.commit().await?;
    println!("   ✓ Deleted {} demo activity, enrollment and notification rows", deleted);
    Ok(deleted)
}
