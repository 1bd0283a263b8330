use crate::infra::{build_portal, InMemoryResourceStorage, Portal, SAMPLE_MANAGERS};
use clap::Args;
use electees::config::PortalConfig;
use electees::electees::domain::{MemberId, Term};
use electees::electees::survey::{PartFields, QuestionFields, SurveyFields, SurveySchema};
use electees::electees::{
    GroupFields, PointsFields, PortalError, ResourceFields, RowInput, Upload,
};
use electees::error::AppError;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Roster CSV (uniqname,first_name,last_name,standing,status). Defaults to a built-in sample.
    #[arg(long)]
    pub(crate) roster_csv: Option<PathBuf>,
    /// Label for the demo term.
    #[arg(long, default_value = "Fall 2026")]
    pub(crate) term_label: String,
    /// Skip the interview survey portion of the demo.
    #[arg(long)]
    pub(crate) skip_survey: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        roster_csv,
        term_label,
        skip_survey,
    } = args;

    let config = PortalConfig {
        current_term_id: 1,
        current_term_label: term_label,
        roster_csv,
        managers: BTreeSet::new(),
    };
    let (portal, storage) = build_portal(&config)?;
    let term = portal.current_term()?;

    println!("Electee portal demo for {term}");
    demo_teams(&portal, &term)?;
    demo_resources(&portal, &storage, &term)?;

    if skip_survey {
        println!("\nInterview survey: skipped");
    } else {
        demo_survey(&portal, &term)?;
    }

    Ok(())
}

fn demo_teams(portal: &Portal, term: &Term) -> Result<(), AppError> {
    let manager = MemberId::from(SAMPLE_MANAGERS[0]);
    let rows = [
        RowInput::added(GroupFields {
            group_name: "Team Tau".to_string(),
            leaders: vec![manager.clone()],
            officers: Vec::new(),
        }),
        RowInput::added(GroupFields {
            group_name: "Team Beta".to_string(),
            leaders: vec![manager],
            officers: Vec::new(),
        }),
    ];
    let summary = portal.groups.edit_groups(term, &rows)?;
    println!("\nTeams created: {}", summary.created);

    let overview = portal.groups.membership(term)?;
    let groups = portal.groups.groups(term)?;
    let mut assignments = serde_json::Map::new();
    for (index, electee) in overview.unassigned_electees.iter().enumerate() {
        let Some(group) = groups.get(index % groups.len().max(1)) else {
            continue;
        };
        let slot = assignments
            .entry(group.id.to_string())
            .or_insert_with(|| json!([]));
        if let Some(members) = slot.as_array_mut() {
            members.push(json!(electee.uniqname));
        }
    }
    let assigned = portal
        .groups
        .replace_memberships(term, &serde_json::Value::Object(assignments).to_string())?;
    println!("Membership saved for {assigned} teams");

    if let Some(first) = groups.first() {
        let manual = [RowInput::added(PointsFields {
            electee_group: Some(first.id),
            description: "Kickoff social".to_string(),
            points: Some(5),
        })];
        portal.groups.edit_points(term, &manual)?;
    }
    for (offset, group) in groups.iter().enumerate() {
        let related_event_id = 1_000 + offset as u64;
        portal
            .groups
            .award_event_points(term, group.id, related_event_id, 3, "Service project")?;
    }

    println!("\nStandings");
    for group in portal.groups.groups(term)? {
        println!(
            "  {:<12} {:>3} pts  members: {}",
            group.group_name,
            group.points,
            group
                .members
                .iter()
                .map(MemberId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

fn demo_resources(
    portal: &Portal,
    storage: &InMemoryResourceStorage,
    term: &Term,
) -> Result<(), AppError> {
    let packet_type = portal
        .resources
        .resource_types()?
        .into_iter()
        .find(|kind| kind.is_packet);
    let Some(packet_type) = packet_type else {
        println!("\nResources: no packet type configured");
        return Ok(());
    };

    let rows = [RowInput::added(ResourceFields {
        resource_type: Some(packet_type.id),
        upload: Some(Upload::new(
            "electee-packet.pdf",
            b"%PDF-1.4 electee packet".to_vec(),
        )),
    })];
    portal.resources.edit(term, &rows)?;

    let listing = portal.resources.listing(term)?;
    println!("\nResources");
    println!("  Packets: {}", listing.packets.len());
    for key in storage.keys() {
        println!("  Stored: {key}");
    }
    Ok(())
}

fn demo_survey(portal: &Portal, term: &Term) -> Result<(), AppError> {
    println!("\nInterview survey");
    portal.survey.save_survey(
        term,
        &SurveyFields {
            due_date: chrono::NaiveDate::from_ymd_opt(2026, 11, 20),
            instructions: "Answer each question in your own words.".to_string(),
        },
    )?;

    portal.survey.edit_parts(&[RowInput::added(PartFields {
        title: "About You".to_string(),
        number: Some(1),
        instructions: String::new(),
        all_required: Some(true),
    })])?;
    let part = portal
        .survey
        .parts()?
        .into_iter()
        .next()
        .ok_or_else(|| PortalError::NotFound("survey part".to_string()))?;

    portal.survey.edit_questions(&[
        RowInput::added(QuestionFields {
            part: Some(part.id),
            number: Some(1),
            text: "Why do you want to join?".to_string(),
            max_words: Some(50),
        }),
        RowInput::added(QuestionFields {
            part: Some(part.id),
            number: Some(2),
            text: "Describe a project you are proud of.".to_string(),
            max_words: None,
        }),
    ])?;
    let questions: Vec<_> = portal
        .survey
        .questions()?
        .into_iter()
        .map(|question| question.id)
        .collect();
    let survey = portal.survey.attach_questions(term, &questions)?;
    println!(
        "  Due {} with {} questions",
        survey.due_date,
        survey.questions.len()
    );

    let electee = portal
        .groups
        .membership(term)?
        .groups
        .into_iter()
        .flat_map(|group| group.members)
        .next();
    let Some(electee) = electee else {
        println!("  No electees on the roster to answer");
        return Ok(());
    };

    let mut answers = HashMap::new();
    if let Some(&first) = questions.first() {
        answers.insert(
            SurveySchema::field_name(first),
            "To serve and grow as an engineer.".to_string(),
        );
    }
    match portal.survey.complete(term, &electee, &answers) {
        Ok(summary) => println!("  {electee} answered {} questions", summary.created),
        Err(err) => println!("  Submission rejected: {err}"),
    }

    let completion = portal.survey.completion(term, &electee)?;
    println!(
        "  Still missing for {electee}: {} required answers",
        completion.missing_required.len()
    );
    Ok(())
}
