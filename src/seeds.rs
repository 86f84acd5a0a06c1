//! Built-in catalog content so the service is useful without a config file.

use crate::domain::{Achievement, AchievementRule, Question, QuestionKind, Quiz};

fn achievement(code: &str, name: &str, description: &str, rule: AchievementRule, xp_reward: u32) -> Achievement {
  Achievement {
    code: code.into(),
    name: name.into(),
    description: description.into(),
    rule,
    xp_reward,
    active: true,
  }
}

pub fn seed_achievements() -> Vec<Achievement> {
  vec![
    achievement("first_lesson", "Bước đầu tiên", "Hoàn thành bài học đầu tiên", AchievementRule::LessonsCompleted { at_least: 1 }, 10),
    achievement("lessons_10", "Người học chăm chỉ", "Hoàn thành 10 bài học", AchievementRule::LessonsCompleted { at_least: 10 }, 50),
    achievement("first_quiz", "Thử sức", "Nộp bài kiểm tra đầu tiên", AchievementRule::QuizzesCompleted { at_least: 1 }, 10),
    achievement("perfect_quiz", "Điểm tuyệt đối", "Đạt 100% một bài kiểm tra", AchievementRule::PerfectQuizzes { at_least: 1 }, 25),
    achievement("streak_3", "Giữ lửa", "Học 3 ngày liên tiếp", AchievementRule::CurrentStreak { at_least: 3 }, 15),
    achievement("streak_7", "Một tuần bền bỉ", "Học 7 ngày liên tiếp", AchievementRule::LongestStreak { at_least: 7 }, 50),
    achievement("level_5", "Nhà hóa học trẻ", "Đạt cấp độ 5", AchievementRule::Level { at_least: 5 }, 30),
    achievement("xp_1000", "Nghìn điểm", "Tích lũy 1000 XP", AchievementRule::TotalXp { at_least: 1000 }, 0),
  ]
}

fn choice(id: &str, prompt: &str, options: &[&str], correct: u32) -> Question {
  Question {
    id: id.into(),
    prompt: prompt.into(),
    kind: QuestionKind::MultipleChoice,
    options: options.iter().map(|s| s.to_string()).collect(),
    correct_option: Some(correct),
    max_score: 0,
    reference_answer: None,
  }
}

fn true_false(id: &str, prompt: &str, truth: bool) -> Question {
  Question {
    id: id.into(),
    prompt: prompt.into(),
    kind: QuestionKind::TrueFalse,
    options: vec!["Đúng".into(), "Sai".into()],
    correct_option: Some(if truth { 0 } else { 1 }),
    max_score: 0,
    reference_answer: None,
  }
}

pub fn seed_quizzes() -> Vec<Quiz> {
  vec![
    Quiz {
      id: "hoa-10-nguyen-tu".into(),
      title: "Cấu tạo nguyên tử".into(),
      subject: "hoa_hoc".into(),
      questions: vec![
        choice("q1", "Hạt nào mang điện tích âm?", &["Proton", "Electron", "Neutron", "Hạt nhân"], 1),
        choice("q2", "Số hiệu nguyên tử của oxi là?", &["6", "7", "8", "16"], 2),
        choice("q3", "Đồng vị là các nguyên tử có cùng?", &["Số proton", "Số neutron", "Số khối", "Khối lượng"], 0),
        true_false("q4", "Khối lượng nguyên tử tập trung chủ yếu ở lớp vỏ.", false),
      ],
    },
    Quiz {
      id: "vatly-10-luc".into(),
      title: "Định luật Newton".into(),
      subject: "vat_ly".into(),
      questions: vec![
        choice("q1", "Đơn vị của lực là?", &["J", "W", "N", "Pa"], 2),
        true_false("q2", "Vật không chịu lực tác dụng thì luôn đứng yên.", false),
        Question {
          id: "e1".into(),
          prompt: "Giải thích vì sao hành khách bị ngả về phía trước khi xe phanh gấp.".into(),
          kind: QuestionKind::Essay,
          options: vec![],
          correct_option: None,
          max_score: 5,
          reference_answer: Some("Do quán tính, cơ thể hành khách có xu hướng giữ nguyên vận tốc cũ.".into()),
        },
      ],
    },
  ]
}
