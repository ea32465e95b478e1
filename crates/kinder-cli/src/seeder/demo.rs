//! Fake classes, teachers, students and parents for demos.
//!
//! Generation runs in parallel with rayon; inserts are multi-row and batched
//! inside one transaction. Generated rows are marked by username and class
//! code prefixes so [`clear_demo_roster`] removes exactly what was added.

use fake::Fake;
use fake::faker::address::en::{CityName, StreetName};
use fake::faker::company::en::CompanyName;
use fake::faker::job::en::Title;
use fake::faker::name::en::{FirstName, LastName};
use kinder_core::{OpsError, RoleCode};
use kinder_models::RoleId;
use rayon::prelude::*;
use sqlx::{MySql, MySqlConnection, MySqlPool, QueryBuilder};
use std::collections::HashMap;
use std::time::Instant;
use tracing::instrument;

use super::hash_password;
use super::roles::load_roles;
use super::models::{
    ClassSeed, DEMO_EMAIL_DOMAIN, ParentSeed, ROSTER_CLASS_PREFIX, ROSTER_USERNAME_PREFIX, Roster,
    RosterConfig, StudentSeed, TeacherSeed, UserSeed,
};

/// Rows per multi-row INSERT; keeps statements well under `max_allowed_packet`.
const BATCH_SIZE: usize = 500;

const GRADES: [(i32, &str, i32); 3] = [(1, "Small", 4), (2, "Middle", 5), (3, "Large", 6)];
const CLASSROOMS: [&str; 6] = ["Rainbow", "Sunshine", "Star", "Wisdom", "Dream", "Garden"];
const MAJORS: [&str; 6] = [
    "Early Childhood Education",
    "Child Psychology",
    "Music Education",
    "Physical Education",
    "Art Education",
    "English Education",
];

/// School year the generated students are enrolled in.
const ENROLLMENT_YEAR: i32 = 2024;

fn phone(seq: usize) -> String {
    format!("139{:08}", seq % 100_000_000)
}

fn roster_user(role: RoleCode, tag: &str, seq: usize, password_hash: &str) -> UserSeed {
    let first: String = FirstName().fake();
    let last: String = LastName().fake();
    let username = format!("{}{}_{}", ROSTER_USERNAME_PREFIX, tag, seq);
    UserSeed {
        email: format!("{}@{}", username, DEMO_EMAIL_DOMAIN),
        username,
        real_name: format!("{} {}", first, last),
        phone: phone(seq),
        role,
        password_hash: password_hash.to_string(),
    }
}

fn generate_class(index: usize) -> ClassSeed {
    let (class_type, grade, age) = GRADES[index % GRADES.len()];
    ClassSeed {
        code: format!("{}{:03}", ROSTER_CLASS_PREFIX, index + 1),
        name: format!("{} {} ({}-{})", grade, (b'A' + (index / GRADES.len()) as u8 % 26) as char, age - 1, age),
        class_type,
        grade: grade.to_string(),
        capacity: 30,
        classroom: format!("{} Room", CLASSROOMS[index % CLASSROOMS.len()]),
    }
}

fn generate_student(class_index: usize, class: &ClassSeed, seq: usize) -> StudentSeed {
    let first: String = FirstName().fake();
    let last: String = LastName().fake();
    let age_years = GRADES
        .iter()
        .find(|(t, _, _)| *t == class.class_type)
        .map(|(_, _, age)| *age)
        .unwrap_or(5);
    let month: u32 = (1..13).fake();
    let day: u32 = (1..29).fake();
    StudentSeed {
        student_no: format!("DS{:06}", seq),
        name: format!("{} {}", first, last),
        gender: if (0..2).fake::<u8>() == 0 { "male" } else { "female" }.to_string(),
        birth_date: format!("{}-{:02}-{:02}", ENROLLMENT_YEAR - age_years, month, day),
        class_index,
    }
}

/// Builds the whole roster in memory.
pub fn generate_roster(config: &RosterConfig, password_hash: &str) -> Roster {
    let classes: Vec<ClassSeed> = (0..config.classes).into_par_iter().map(generate_class).collect();

    let teachers: Vec<TeacherSeed> = (0..config.classes)
        .into_par_iter()
        .flat_map_iter(|class_index| {
            (0..config.teachers_per_class).map(move |i| {
                let seq = class_index * config.teachers_per_class + i;
                TeacherSeed {
                    user: roster_user(RoleCode::Teacher, "t", seq, password_hash),
                    teacher_no: format!("DT{:05}", seq),
                    major: MAJORS[seq % MAJORS.len()].to_string(),
                    class_index,
                }
            })
        })
        .collect();

    let students: Vec<StudentSeed> = classes
        .par_iter()
        .enumerate()
        .flat_map_iter(|(class_index, class)| {
            (0..config.students_per_class).map(move |i| {
                generate_student(class_index, class, class_index * config.students_per_class + i)
            })
        })
        .collect();

    let per_parent = config.students_per_parent.max(1);
    let parents: Vec<ParentSeed> = (0..students.len())
        .into_par_iter()
        .filter(|i| (i % config.students_per_class.max(1)) % per_parent == 0)
        .map(|student_index| {
            let street: String = StreetName().fake();
            let city: String = CityName().fake();
            ParentSeed {
                // Offset keeps parent phones clear of teacher phones.
                user: roster_user(RoleCode::Parent, "p", 50_000 + student_index, password_hash),
                relationship: if student_index % 2 == 0 { "father" } else { "mother" }.to_string(),
                occupation: Title().fake(),
                work_unit: CompanyName().fake(),
                address: format!("{} {}, {}", (1..999).fake::<u32>(), street, city),
                student_index,
            }
        })
        .collect();

    Roster {
        classes,
        teachers,
        students,
        parents,
    }
}

async fn insert_users(conn: &mut MySqlConnection, users: &[&UserSeed]) -> Result<(), sqlx::Error> {
    for chunk in users.chunks(BATCH_SIZE) {
        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO users (username, password, email, role, phone, status, real_name, created_at, updated_at) ",
        );
        query.push_values(chunk, |mut row, user| {
            row.push_bind(&user.username)
                .push_bind(&user.password_hash)
                .push_bind(&user.email)
                .push_bind(user.role.as_str())
                .push_bind(&user.phone)
                .push_bind("active")
                .push_bind(&user.real_name)
                .push("NOW()")
                .push("NOW()");
        });
        query.build().execute(&mut *conn).await?;
    }
    Ok(())
}

async fn ids_by_key(conn: &mut MySqlConnection, sql: &str, pattern: &str) -> Result<HashMap<String, i64>, sqlx::Error> {
    let rows: Vec<(i64, String)> = sqlx::query_as(sql).bind(pattern).fetch_all(&mut *conn).await?;
    Ok(rows.into_iter().map(|(id, key)| (key, id)).collect())
}

fn id_for(map: &HashMap<String, i64>, key: &str) -> Result<i64, OpsError> {
    map.get(key)
        .copied()
        .ok_or_else(|| OpsError::missing(format!("row '{}' not found after insert", key)))
}

/// `(user_id, role_id)` pairs for every generated teacher and parent account.
fn roster_role_links(
    roster: &Roster,
    user_ids: &HashMap<String, i64>,
    roles: &HashMap<RoleCode, RoleId>,
) -> Result<Vec<(i64, i64)>, OpsError> {
    let users = roster
        .teachers
        .iter()
        .map(|t| &t.user)
        .chain(roster.parents.iter().map(|p| &p.user));
    let mut links = Vec::with_capacity(roster.teachers.len() + roster.parents.len());
    for user in users {
        let role_id = roles
            .get(&user.role)
            .ok_or_else(|| OpsError::missing(format!("role '{}' not found", user.role)))?;
        links.push((id_for(user_ids, &user.username)?, role_id.into_inner()));
    }
    Ok(links)
}

async fn link_roster_roles(
    conn: &mut MySqlConnection,
    roster: &Roster,
    user_ids: &HashMap<String, i64>,
    roles: &HashMap<RoleCode, RoleId>,
) -> Result<(), OpsError> {
    let links = roster_role_links(roster, user_ids, roles)?;
    for chunk in links.chunks(BATCH_SIZE) {
        let mut query: QueryBuilder<MySql> =
            QueryBuilder::new("INSERT IGNORE INTO user_roles (user_id, role_id, created_at, updated_at) ");
        query.push_values(chunk, |mut row, (user_id, role_id)| {
            row.push_bind(*user_id).push_bind(*role_id).push("NOW()").push("NOW()");
        });
        query.build().execute(&mut *conn).await?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterReport {
    pub classes: usize,
    pub teachers: usize,
    pub students: usize,
    pub parents: usize,
}

/// Inserts a generated roster under the first kindergarten.
#[instrument(skip_all, fields(classes = config.classes))]
pub async fn seed_demo_roster(pool: &MySqlPool, config: &RosterConfig) -> Result<RosterReport, OpsError> {
    let start_time = Instant::now();
    println!("🌱 Seeding demo roster...");
    println!(
        "   - Classes: {}, teachers per class: {}, students per class: {}",
        config.classes, config.teachers_per_class, config.students_per_class
    );

    let kindergarten_id = sqlx::query_scalar::<_, i64>("SELECT id FROM kindergartens ORDER BY id LIMIT 1")
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| OpsError::missing("no kindergarten row; create one before seeding demo data"))?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classes WHERE code LIKE ?")
        .bind(format!("{}%", ROSTER_CLASS_PREFIX))
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Err(OpsError::already_exists(
            "a demo roster; run clear-demo-data first",
        ));
    }
    let roles = load_roles(pool).await?;

    println!("\n🔧 Generating fake data in parallel...");
    let gen_start = Instant::now();
    let password_hash = hash_password("kinder123", 4)?;
    let roster = generate_roster(config, &password_hash);
    println!(
        "   ✓ Generated {} classes, {} teachers, {} students, {} parents in {:?}",
        roster.classes.len(),
        roster.teachers.len(),
        roster.students.len(),
        roster.parents.len(),
        gen_start.elapsed()
    );

    let mut tx = pool.begin().await?;

    println!("\n🏫 Inserting classes...");
    for chunk in roster.classes.chunks(BATCH_SIZE) {
        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO classes (name, code, kindergarten_id, type, grade, capacity, current_student_count, \
             classroom, status, description, created_at, updated_at) ",
        );
        query.push_values(chunk, |mut row, class| {
            row.push_bind(&class.name)
                .push_bind(&class.code)
                .push_bind(kindergarten_id)
                .push_bind(class.class_type)
                .push_bind(&class.grade)
                .push_bind(class.capacity)
                .push_bind(0)
                .push_bind(&class.classroom)
                .push_bind(1)
                .push_bind("Demo class")
                .push("NOW()")
                .push("NOW()");
        });
        query.build().execute(&mut *tx).await?;
    }
    let class_ids = ids_by_key(
        &mut tx,
        "SELECT id, code FROM classes WHERE code LIKE ?",
        &format!("{}%", ROSTER_CLASS_PREFIX),
    )
    .await?;

    println!("👩‍🏫 Inserting teachers...");
    let teacher_users: Vec<&UserSeed> = roster.teachers.iter().map(|t| &t.user).collect();
    let parent_users: Vec<&UserSeed> = roster.parents.iter().map(|p| &p.user).collect();
    insert_users(&mut tx, &teacher_users).await?;
    insert_users(&mut tx, &parent_users).await?;
    let user_ids = ids_by_key(
        &mut tx,
        "SELECT id, username FROM users WHERE username LIKE ?",
        &format!("{}%", ROSTER_USERNAME_PREFIX.replace('_', "\\_")),
    )
    .await?;
    link_roster_roles(&mut tx, &roster, &user_ids, &roles).await?;

    for chunk in roster.teachers.chunks(BATCH_SIZE) {
        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO teachers (user_id, kindergarten_id, teacher_no, position, education, major, status, \
             created_at, updated_at) ",
        );
        let mut rows = Vec::with_capacity(chunk.len());
        for teacher in chunk {
            rows.push((id_for(&user_ids, &teacher.user.username)?, teacher));
        }
        query.push_values(rows, |mut row, (user_id, teacher)| {
            row.push_bind(user_id)
                .push_bind(kindergarten_id)
                .push_bind(&teacher.teacher_no)
                .push_bind(2)
                .push_bind(4)
                .push_bind(&teacher.major)
                .push_bind(1)
                .push("NOW()")
                .push("NOW()");
        });
        query.build().execute(&mut *tx).await?;
    }
    let teacher_ids = ids_by_key(
        &mut tx,
        "SELECT id, teacher_no FROM teachers WHERE teacher_no LIKE ?",
        "DT%",
    )
    .await?;

    let mut assignments = Vec::with_capacity(roster.teachers.len());
    for (i, teacher) in roster.teachers.iter().enumerate() {
        let class = &roster.classes[teacher.class_index];
        assignments.push((
            id_for(&teacher_ids, &teacher.teacher_no)?,
            id_for(&class_ids, &class.code)?,
            i % config.teachers_per_class.max(1) == 0,
        ));
    }
    for chunk in assignments.chunks(BATCH_SIZE) {
        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO class_teachers (teacher_id, class_id, is_main_teacher, start_date, status, \
             created_at, updated_at) ",
        );
        query.push_values(chunk, |mut row, (teacher_id, class_id, main)| {
            row.push_bind(*teacher_id)
                .push_bind(*class_id)
                .push_bind(*main)
                .push_bind(format!("{}-09-01", ENROLLMENT_YEAR))
                .push_bind(1)
                .push("NOW()")
                .push("NOW()");
        });
        query.build().execute(&mut *tx).await?;
    }

    println!("👶 Inserting students and parents...");
    for chunk in roster.students.chunks(BATCH_SIZE) {
        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO students (name, student_no, kindergarten_id, class_id, gender, birth_date, \
             enrollment_date, status, created_at, updated_at) ",
        );
        let mut rows = Vec::with_capacity(chunk.len());
        for student in chunk {
            rows.push((id_for(&class_ids, &roster.classes[student.class_index].code)?, student));
        }
        query.push_values(rows, |mut row, (class_id, student)| {
            row.push_bind(&student.name)
                .push_bind(&student.student_no)
                .push_bind(kindergarten_id)
                .push_bind(class_id)
                .push_bind(&student.gender)
                .push_bind(&student.birth_date)
                .push_bind(format!("{}-09-01", ENROLLMENT_YEAR))
                .push_bind(1)
                .push("NOW()")
                .push("NOW()");
        });
        query.build().execute(&mut *tx).await?;
    }
    let student_ids = ids_by_key(
        &mut tx,
        "SELECT id, student_no FROM students WHERE student_no LIKE ?",
        "DS%",
    )
    .await?;

    for chunk in roster.parents.chunks(BATCH_SIZE) {
        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO parents (user_id, student_id, relationship, is_primary_contact, is_legal_guardian, \
             work_unit, occupation, address, created_at, updated_at) ",
        );
        let mut rows = Vec::with_capacity(chunk.len());
        for parent in chunk {
            let student = &roster.students[parent.student_index];
            rows.push((
                id_for(&user_ids, &parent.user.username)?,
                id_for(&student_ids, &student.student_no)?,
                parent,
            ));
        }
        query.push_values(rows, |mut row, (user_id, student_id, parent)| {
            row.push_bind(user_id)
                .push_bind(student_id)
                .push_bind(&parent.relationship)
                .push_bind(true)
                .push_bind(true)
                .push_bind(&parent.work_unit)
                .push_bind(&parent.occupation)
                .push_bind(&parent.address)
                .push("NOW()")
                .push("NOW()");
        });
        query.build().execute(&mut *tx).await?;
    }

    sqlx::query(
        r#"
        UPDATE classes c
        SET current_student_count = (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id)
        WHERE c.code LIKE ?
        "#,
    )
    .bind(format!("{}%", ROSTER_CLASS_PREFIX))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let report = RosterReport {
        classes: roster.classes.len(),
        teachers: roster.teachers.len(),
        students: roster.students.len(),
        parents: roster.parents.len(),
    };
    println!("\n✅ Demo roster seeded in {:?}", start_time.elapsed());
    Ok(report)
}

/// Removes everything [`seed_demo_roster`] inserted, children first.
#[instrument(skip_all)]
pub async fn clear_demo_roster(pool: &MySqlPool) -> Result<RosterReport, OpsError> {
    let start_time = Instant::now();
    println!("🗑️  Clearing demo roster...");

    let users_like = format!("{}%", ROSTER_USERNAME_PREFIX.replace('_', "\\_"));
    let classes_like = format!("{}%", ROSTER_CLASS_PREFIX);
    let mut tx = pool.begin().await?;

    let parents = sqlx::query("DELETE FROM parents WHERE user_id IN (SELECT id FROM users WHERE username LIKE ?)")
        .bind(&users_like)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query(
        "DELETE FROM class_teachers WHERE class_id IN (SELECT id FROM classes WHERE code LIKE ?)",
    )
    .bind(&classes_like)
    .execute(&mut *tx)
    .await?;
    let teachers = sqlx::query("DELETE FROM teachers WHERE user_id IN (SELECT id FROM users WHERE username LIKE ?)")
        .bind(&users_like)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let students = sqlx::query("DELETE FROM students WHERE class_id IN (SELECT id FROM classes WHERE code LIKE ?)")
        .bind(&classes_like)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM user_roles WHERE user_id IN (SELECT id FROM users WHERE username LIKE ?)")
        .bind(&users_like)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE username LIKE ?")
        .bind(&users_like)
        .execute(&mut *tx)
        .await?;
    let classes = sqlx::query("DELETE FROM classes WHERE code LIKE ?")
        .bind(&classes_like)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    let report = RosterReport {
        classes: classes as usize,
        teachers: teachers as usize,
        students: students as usize,
        parents: parents as usize,
    };
    println!(
        "   ✓ Deleted {} classes, {} teachers, {} students, {} parents in {:?}",
        report.classes,
        report.teachers,
        report.students,
        report.parents,
        start_time.elapsed()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn small() -> RosterConfig {
        RosterConfig {
            classes: 4,
            teachers_per_class: 2,
            students_per_class: 5,
            students_per_parent: 2,
        }
    }

    #[test]
    fn test_roster_counts_match_config() {
        let config = small();
        let roster = generate_roster(&config, "hash");
        assert_eq!(roster.classes.len(), 4);
        assert_eq!(roster.teachers.len(), 8);
        assert_eq!(roster.students.len(), config.total_students());
        assert_eq!(roster.parents.len(), config.total_parents());
    }

    #[test]
    fn test_roster_keys_are_unique_and_marked() {
        let roster = generate_roster(&small(), "hash");
        let usernames: HashSet<&str> = roster
            .teachers
            .iter()
            .map(|t| t.user.username.as_str())
            .chain(roster.parents.iter().map(|p| p.user.username.as_str()))
            .collect();
        assert_eq!(usernames.len(), roster.teachers.len() + roster.parents.len());
        assert!(usernames.iter().all(|u| u.starts_with(ROSTER_USERNAME_PREFIX)));

        let codes: HashSet<&str> = roster.classes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes.len(), roster.classes.len());
        assert!(codes.iter().all(|c| c.starts_with(ROSTER_CLASS_PREFIX)));

        let student_nos: HashSet<&str> = roster.students.iter().map(|s| s.student_no.as_str()).collect();
        assert_eq!(student_nos.len(), roster.students.len());
    }

    #[test]
    fn test_references_stay_in_bounds() {
        let roster = generate_roster(&small(), "hash");
        assert!(roster.teachers.iter().all(|t| t.class_index < roster.classes.len()));
        assert!(roster.students.iter().all(|s| s.class_index < roster.classes.len()));
        assert!(roster.parents.iter().all(|p| p.student_index < roster.students.len()));
        assert!(roster.parents.iter().all(|p| p.user.role == RoleCode::Parent));
    }

    #[test]
    fn test_every_roster_account_gets_its_role() {
        let roster = generate_roster(&small(), "hash");
        let user_ids: HashMap<String, i64> = roster
            .teachers
            .iter()
            .map(|t| &t.user)
            .chain(roster.parents.iter().map(|p| &p.user))
            .enumerate()
            .map(|(i, user)| (user.username.clone(), i as i64 + 100))
            .collect();
        let roles: HashMap<RoleCode, RoleId> = [(RoleCode::Teacher, RoleId::new(3)), (RoleCode::Parent, RoleId::new(4))]
            .into_iter()
            .collect();

        let links = roster_role_links(&roster, &user_ids, &roles).unwrap();
        assert_eq!(links.len(), roster.teachers.len() + roster.parents.len());
        let teacher_links = links.iter().filter(|(_, role)| *role == 3).count();
        assert_eq!(teacher_links, roster.teachers.len());

        let only_teachers: HashMap<RoleCode, RoleId> = [(RoleCode::Teacher, RoleId::new(3))].into_iter().collect();
        let err = roster_role_links(&roster, &user_ids, &only_teachers).unwrap_err();
        assert!(matches!(err, OpsError::MissingPrerequisite(_)));
    }

    #[test]
    fn test_birth_dates_follow_grade() {
        let roster = generate_roster(&small(), "hash");
        for student in &roster.students {
            let class = &roster.classes[student.class_index];
            let year: i32 = student.birth_date[..4].parse().unwrap();
            let expected = GRADES.iter().find(|g| g.0 == class.class_type).unwrap().2;
            assert_eq!(year, ENROLLMENT_YEAR - expected);
        }
    }
}
